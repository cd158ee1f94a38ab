use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: holds placed. Labels: none.
pub const HOLDS_PLACED_TOTAL: &str = "seatgrid_holds_placed_total";

/// Counter: hold attempts rejected. Labels: kind.
pub const HOLDS_REJECTED_TOTAL: &str = "seatgrid_holds_rejected_total";

/// Counter: bookings confirmed.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "seatgrid_bookings_confirmed_total";

/// Counter: bookings canceled. Labels: by (user/admin).
pub const BOOKINGS_CANCELED_TOTAL: &str = "seatgrid_bookings_canceled_total";

/// Counter: bookings marked no-show.
pub const NO_SHOWS_TOTAL: &str = "seatgrid_no_shows_total";

/// Counter: slots created by generation.
pub const SLOTS_GENERATED_TOTAL: &str = "seatgrid_slots_generated_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: expired holds reclaimed by the sweeper.
pub const HOLDS_SWEPT_TOTAL: &str = "seatgrid_holds_swept_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "seatgrid_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "seatgrid_journal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt subscriber. For embedding binaries and examples;
/// tests and libraries should not call this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
