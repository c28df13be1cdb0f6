//! Request metrics.
//!
//! Metrics are recorded through the `metrics` facade, so they go to whatever
//! recorder the application installed and are dropped when there is none.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `switchyard_requests_total` | Counter | `method`, `status`, `kind` |
//! | `switchyard_request_duration_seconds` | Histogram | `method`, `kind` |
//! | `switchyard_middleware_generations_total` | Counter | `middleware` |

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Counter of completed requests.
pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";

/// Histogram of request durations, in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";

/// Counter of middleware generator invocations.
pub const MIDDLEWARE_GENERATIONS_TOTAL: &str = "switchyard_middleware_generations_total";

/// Whether a request came from a transport or from the child dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Arrived through a transport.
    External,
    /// Dispatched in-process.
    Child,
}

impl RequestKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Child => "child",
        }
    }
}

/// Registers descriptions for the metrics above with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of completed requests");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time from route match to response"
    );
    describe_counter!(
        MIDDLEWARE_GENERATIONS_TOTAL,
        "Number of times a middleware generator produced a hook"
    );
}

/// Records a completed request.
pub fn record_request(method: &str, status_code: u16, kind: RequestKind, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status_code.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "kind" => kind.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Records one middleware generation.
pub fn record_generation(middleware: &str) {
    counter!(MIDDLEWARE_GENERATIONS_TOTAL, "middleware" => middleware.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("GET", 200, RequestKind::External, Duration::from_millis(3));
        record_request("GET", 404, RequestKind::Child, Duration::ZERO);
        record_generation("auth");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(RequestKind::External.as_str(), "external");
        assert_eq!(RequestKind::Child.as_str(), "child");
    }
}
