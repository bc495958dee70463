//! `scout stats`

use super::with_context;
use crate::console::CliConsole;
use colored::*;
use scout_core::cache::CacheStatistics;
use scout_core::config::ScoutConfig;
use scout_core::error::{ScoutError, ScoutResult};
use scout_session::EventStoreStats;
use serde::Serialize;

#[derive(Serialize)]
struct StatsReport {
    cache: CacheStatistics,
    events: EventStoreStats,
}

/// Print cache and event store statistics
pub async fn show(config: ScoutConfig, json: bool) -> ScoutResult<()> {
    let report = with_context(config, |context| {
        let cache = context.cache();
        let events = context.events();
        async move {
            Ok::<_, ScoutError>(StatsReport {
                cache: cache.get_stats(),
                events: events.get_stats().await?,
            })
        }
    })
    .await?;

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| ScoutError::json(format!("Failed to render statistics: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &StatsReport) {
    let console = CliConsole::new(true);
    let cache = &report.cache;

    console.print_header("Request cache");
    console.print_field("Entries", format!("{} / {}", cache.size, cache.max_size));
    console.print_field("Hit rate", format!("{:.1}%", cache.hit_rate() * 100.0));
    console.print_field("Hits", format!("{} ({} stale)", cache.hits, cache.stale_hits));
    console.print_field("Misses", cache.misses);
    console.print_field("Computations", cache.computations);
    console.print_field(
        "Revalidations",
        format!("{} ({} failed)", cache.revalidations, cache.revalidation_failures),
    );
    console.print_field("Evictions", cache.evictions);
    console.print_field("Expirations", cache.expirations);
    console.print_field("Pending writes", cache.pending_writes);

    let events = &report.events;
    console.print_header("Event store");
    console.print_field(
        "Encryption",
        if events.encrypted { "enabled".green() } else { "disabled".dimmed() },
    );
    console.print_field(
        "Resident events",
        format!("{} / {}", events.resident_events, events.max_total_events),
    );
    console.print_field("Events on disk", events.total_on_disk());
    console.print_field("Stream evictions", events.stream_evictions);
    console.print_field("Global evictions", events.global_evictions);
    console.print_field("Expired streams", events.expired_streams);

    if events.streams.is_empty() {
        return;
    }
    console.print_separator();
    for stream in &events.streams {
        let activity = stream
            .last_activity
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:>6} resident {:>8} on disk  {}",
            stream.stream_id.bold(),
            stream.resident_events,
            stream.on_disk,
            activity.dimmed()
        );
    }
}
