use anyhow::Result;
use confab::cli;
use confab::console;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = cli::run().await {
        console::present_error(&e);
        std::process::exit(1);
    }
    Ok(())
}
