//! Voidground server
//!
//! Serves the background-removal endpoint over HTTP.

#[cfg(feature = "cli")]
use voidground::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
