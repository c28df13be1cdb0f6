//! Turning route errors into responses.

use switchyard_core::{ErrorBody, Reply, RouteError, RouteRequest};

/// Writes an error response for a failed request.
///
/// Called once per failed request, after the route's error hooks, and only
/// when none of them sent a reply.
pub trait ErrorHandler: Send + Sync {
    /// Writes status and body for `error` into `reply`.
    fn handle(&self, error: &RouteError, request: &RouteRequest, reply: &Reply);
}

/// Sends [`ErrorBody`] with the error's status.
///
/// Validation errors list their fields; internal errors collapse to the
/// generic `S001` message unless `debug` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler {
    debug: bool,
}

impl DefaultErrorHandler {
    /// Creates a handler; `debug` adds error detail to bodies.
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, error: &RouteError, request: &RouteRequest, reply: &Reply) {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(rid = %request.id, url = %request.url(), error = %error, "request failed");
        } else {
            tracing::debug!(rid = %request.id, url = %request.url(), error = %error, "request rejected");
        }
        reply.set_status(status);
        reply.send(ErrorBody::from_error(error, self.debug).to_value());
    }
}
