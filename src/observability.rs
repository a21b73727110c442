use std::net::SocketAddr;

use crate::engine::TickTrigger;

// ── Tick metrics ────────────────────────────────────────────────

/// Counter: ticks run. Labels: trigger, outcome.
pub const TICKS_TOTAL: &str = "roomwatch_ticks_total";

/// Histogram: tick duration in seconds (expiry + reconcile, including writes).
pub const TICK_DURATION_SECONDS: &str = "roomwatch_tick_duration_seconds";

// ── Write metrics ───────────────────────────────────────────────

/// Counter: repository writes. Labels: target (room|booking), outcome (ok|error).
pub const WRITES_TOTAL: &str = "roomwatch_writes_total";

/// Counter: slot bookings found past their checkout.
pub const SLOT_EXPIRATIONS_TOTAL: &str = "roomwatch_slot_expirations_total";

// ── Snapshot metrics ────────────────────────────────────────────

/// Counter: malformed records seen in delivered snapshots. Labels: feed.
pub const MALFORMED_RECORDS_TOTAL: &str = "roomwatch_malformed_records_total";

/// Gauge: rooms per stored status after the last tick. Labels: status.
pub const ROOMS: &str = "roomwatch_rooms";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a trigger to a short label for metrics.
pub fn trigger_label(trigger: TickTrigger) -> &'static str {
    match trigger {
        TickTrigger::Startup => "startup",
        TickTrigger::Interval => "interval",
        TickTrigger::BookingsChanged => "bookings_changed",
        TickTrigger::RoomsChanged => "rooms_changed",
        TickTrigger::Manual => "manual",
    }
}
