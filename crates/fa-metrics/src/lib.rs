use std::env;
use std::sync::OnceLock;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const RECOGNITION_REQUESTS: &str = "fa_recognition_requests_total";
pub const ATTENDANCE_EVENTS: &str = "fa_attendance_events_total";
pub const LOOKALIKE_REQUESTS: &str = "fa_lookalike_requests_total";
pub const CACHED_IDENTITIES: &str = "fa_cached_identities";

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Initialize a Prometheus exporter listening on `0.0.0.0:<port>`.
///
/// The port comes from `port_env`, falling back to `default_port`. Calling it again
/// returns the handle installed by the first call.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);
    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install_recorder()
    {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!(metrics_port = port, "started prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to start prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
    }
}

/// `outcome`: recognized / not_recognized / no_faces_detected
pub fn record_recognition(outcome: &'static str) {
    counter!(RECOGNITION_REQUESTS, "outcome" => outcome).increment(1);
}

/// `direction`: check_in / check_out
pub fn record_attendance(direction: &'static str) {
    counter!(ATTENDANCE_EVENTS, "direction" => direction).increment(1);
}

pub fn record_lookalike(status: &'static str) {
    counter!(LOOKALIKE_REQUESTS, "status" => status).increment(1);
}

pub fn set_cached_identities(count: usize) {
    gauge!(CACHED_IDENTITIES).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_on_missing_or_invalid_values() {
        assert_eq!(resolve_port(Some("9200".into()), 9101), 9200);
        assert_eq!(resolve_port(Some("not-a-port".into()), 9101), 9101);
        assert_eq!(resolve_port(Some("70000".into()), 9101), 9101);
        assert_eq!(resolve_port(None, 9101), 9101);
    }

    #[test]
    fn recording_without_exporter_is_a_noop() {
        record_recognition("recognized");
        record_attendance("check_in");
        record_lookalike("found");
        set_cached_identities(3);
    }
}
