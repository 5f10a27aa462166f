//! Errors surfaced by the container-runtime client.
//!
//! These never reach a DNS response code directly — they're caught at the
//! ingestor's event loop and bootstrap boundaries (§7) and logged, or
//! wrapped into `AppError::Runtime` and from there into
//! `DNSError::Internal` (SERVFAIL) on the rare path where a runtime call
//! happens inline with request handling.

/// Failures talking to the container runtime, or interpreting what it
/// returned.
#[derive(Debug)]
pub enum RuntimeError {
    /// The Docker Engine API call itself failed (connection refused, socket
    /// permission denied, API version mismatch, ...).
    ///
    /// During bootstrap or the event loop this is logged and the affected
    /// container/event is skipped; at `BollardRuntime::connect` in `main`
    /// it's fatal, since there is no runtime to watch at all.
    Docker(bollard::errors::Error),
    /// The call succeeded but the inspect or event payload was missing a
    /// field the ingestor needs (e.g. no `Id`, or no `State`).
    MissingField(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker(err) => write!(f, "container runtime error: {}", err),
            Self::MissingField(field) => write!(f, "container runtime response missing field: {}", field),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        RuntimeError::Docker(err)
    }
}
