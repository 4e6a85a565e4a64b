use anyhow::Result;
use sesamo::cli::{actions, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments and bring up telemetry
    let (action, globals) = start()?;

    // Handle the action
    actions::server::handle(action, &globals).await
}
