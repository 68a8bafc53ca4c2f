use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: bookings written, confirmed or provisional.
pub const BOOKINGS_CREATED_TOTAL: &str = "lectio_bookings_created_total";

/// Counter: provisional bookings promoted after payment confirmation.
pub const BOOKINGS_PROMOTED_TOTAL: &str = "lectio_bookings_promoted_total";

/// Counter: bookings deleted by an operator.
pub const BOOKINGS_DELETED_TOTAL: &str = "lectio_bookings_deleted_total";

/// Counter: expired provisional bookings purged by the reaper.
pub const PROVISIONAL_EXPIRED_TOTAL: &str = "lectio_provisional_expired_total";

/// Counter: slot conflicts detected at validation or claim time.
pub const CONFLICTS_TOTAL: &str = "lectio_conflicts_total";

/// Histogram: accepted wizard batch size (bookings per submission).
pub const WIZARD_BATCH_SIZE: &str = "lectio_wizard_batch_size";

// ── Attendance ──────────────────────────────────────────────────

/// Counter: verified lesson outcomes. Labels: outcome.
pub const ATTENDANCE_TOTAL: &str = "lectio_attendance_total";

/// Counter: attendance mails that failed to send.
pub const MAIL_FAILURES_TOTAL: &str = "lectio_mail_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
