use std::path::PathBuf;

use anyhow::Result;
use workpulse::{Agent, PortalContext, Settings, ShellEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let settings_path = std::env::var("WORKPULSE_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("workpulse.settings.json"));
    let settings = Settings::load(Some(settings_path.as_path()))?;

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if settings.debug_logging {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    log::info!("workpulse agent starting up...");

    let agent = Agent::new(settings)?;

    if let Ok(credential) = std::env::var("WORKPULSE_SESSION") {
        if !credential.is_empty() {
            agent.bind_credential(credential).await;
        }
    }

    // Standalone runs have no shell reporting navigation, so assume the
    // staff portal; an embedding shell drives this through report() instead.
    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    agent.start_tracking().await;

    tokio::signal::ctrl_c().await?;
    log::info!("interrupt received");
    agent.shutdown().await;

    Ok(())
}
