use anyhow::Result;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    billing_sync::observability::init_observability("billing-sync")?;

    if let Err(error) = billing_sync::run().await {
        error!("billing-sync exited with error: {}", error);
        std::process::exit(1);
    }
    Ok(())
}
