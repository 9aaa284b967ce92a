//! Shared HTTP plumbing for the reqwest adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::CollaboratorError;

/// Client used by both adapters. The executor enforces the per-call timeout;
/// this one only bounds connection setup.
pub(crate) fn build_client(connect_timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| CollaboratorError::Permanent(format!("building HTTP client: {e}")))
}

/// 408, 429 and 5xx are availability problems; everything else is the
/// request's fault.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

pub(crate) fn classify_request_error(what: &str, err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CollaboratorError::Transient(format!("{what}: {err}"))
    } else if err.is_decode() {
        CollaboratorError::Permanent(format!("{what}: malformed response: {err}"))
    } else {
        CollaboratorError::Permanent(format!("{what}: {err}"))
    }
}

/// Turn a non-success response into an error, reading the body for context.
pub(crate) async fn status_error(what: &str, response: Response) -> CollaboratorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    let message = if body.is_empty() {
        format!("{what}: HTTP {status}")
    } else {
        format!("{what}: HTTP {status}: {body}")
    };
    if is_transient_status(status) {
        CollaboratorError::Transient(message)
    } else {
        CollaboratorError::Permanent(message)
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
