//! tunnelwatch - Teredo flow monitor
//!
//! Watches outbound UDP/3544 flows and tells you which process opened them
//! and where they go.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tunnelwatch_cli::run().await
}
