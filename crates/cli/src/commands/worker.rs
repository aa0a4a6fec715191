//! `turngraph worker`: Answer one command envelope on stdin.
//!
//! Spawned by process isolation. The run configuration arrives in the
//! envelope; only the API key is read from this process's configuration.

use turngraph_agent::serve_stdio;
use turngraph_config::AppConfig;

use super::CliFactory;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let factory = CliFactory::new(config.api_key);
    serve_stdio(&factory).await?;
    Ok(())
}
