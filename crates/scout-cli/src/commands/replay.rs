//! `scout replay`

use super::with_context;
use crate::console::CliConsole;
use scout_core::config::ScoutConfig;
use scout_core::error::ScoutResult;
use serde_json::json;

/// Print every event stored after `last_event_id`, one JSON object per line
pub async fn run(config: ScoutConfig, last_event_id: &str) -> ScoutResult<()> {
    let last_event_id = last_event_id.to_string();
    let summary = with_context(config, |context| {
        let events = context.events();
        async move {
            events
                .replay_events_after(&last_event_id, |event| {
                    let line = match &event.message {
                        Ok(message) => json!({
                            "event_id": event.event_id,
                            "stored_at": event.stored_at,
                            "message": message,
                        }),
                        Err(e) => json!({
                            "event_id": event.event_id,
                            "stored_at": event.stored_at,
                            "error": e.to_string(),
                        }),
                    };
                    println!("{}", line);
                    Ok(())
                })
                .await
        }
    })
    .await?;

    let console = CliConsole::new(true);
    if summary.undecryptable > 0 {
        console.warn(&format!(
            "{} of {} events could not be decrypted",
            summary.undecryptable, summary.delivered
        ));
    }
    console.info(&format!(
        "Replayed {} events from {}{}",
        summary.delivered,
        summary.stream_id,
        if summary.from_disk { " (disk)" } else { "" }
    ));
    Ok(())
}
