use anyhow::Result;
use specsbiz_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
