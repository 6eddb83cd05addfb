//! bgcompose CLI tool
//!
//! Command-line interface for refining foreground masks and compositing cut-outs
//! with the bgcompose library.

#[cfg(feature = "cli")]
use bgcompose::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
