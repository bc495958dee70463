//! `scout serve`

use crate::console::CliConsole;
use crate::signal_handler::SignalHandler;
use scout::ServiceContext;
use scout_core::config::ScoutConfig;
use scout_core::error::ScoutResult;
use tracing::info;

/// Keep both stores open until SIGINT or SIGTERM, then flush and exit
pub async fn run(config: ScoutConfig) -> ScoutResult<()> {
    let console = CliConsole::new(true);
    let mut signals = SignalHandler::new()?;

    let context = ServiceContext::initialize(config).await?;
    console.success(&format!(
        "Serving storage at {}",
        context.config().storage_path.display()
    ));
    console.info("Press Ctrl+C to stop");

    let signal = signals.wait().await;
    info!(signal = signal.map(|s| s.name()).unwrap_or("closed"), "shutting down");

    let report = context.shutdown().await;
    match report.into_result() {
        Ok(flushed) => {
            console.success(&format!("Stopped cleanly ({} events flushed)", flushed));
            Ok(())
        }
        Err(e) => {
            console.error(&format!("Shutdown incomplete: {}", e));
            Err(e)
        }
    }
}
