//! Application-level error types shared across the ingestor and registry.
//!
//! These are the errors that occur above the wire protocol: a malformed DNS
//! name handed in from an inspect document, a runtime-client failure the
//! ingestor can't recover from, or a bootstrap I/O error. `DNSError`
//! (see [`crate::error::dns`]) wraps these when they surface while
//! answering a query.

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors produced above the wire protocol: deriving a container record
/// from an inspect document, talking to the container runtime, or doing
/// the process I/O around those (binding the DNS socket, connecting to the
/// runtime endpoint).
///
/// ## DNS Mapping
///
/// `AppError` never reaches a DNS response directly — the ingestor logs
/// and skips it (§7's "isolating boundary" rule). The one path where it
/// does cross into the wire protocol is `From<AppError> for DNSError`
/// (see [`crate::error::dns`]), which always maps to `DNSError::Internal`
/// and from there to SERVFAIL: nothing at this layer is ever the client's
/// fault, so there is no NXDOMAIN-worthy variant here.
#[derive(Debug)]
pub enum AppError {
    /// A derived name (sanitized container name, compose alias, or
    /// `VIRTUAL_HOST` entry) failed to parse as a DNS label. Surfaces from
    /// `derive_container` in `ingest.rs`; the caller logs and skips the
    /// event rather than propagating this further.
    Label(crate::label::LabelError),
    /// The container runtime rejected or failed a request (bootstrap
    /// enumeration, inspect, or event-stream setup). See
    /// [`crate::error::runtime::RuntimeError`] for the underlying cause.
    Runtime(crate::error::runtime::RuntimeError),
    /// Process-level I/O failure outside the runtime client, e.g. the DNS
    /// responder failing to bind its UDP socket. Fatal at `main`: there is
    /// no socket to keep serving on, so this one is not logged-and-skipped
    /// the way the other two variants are.
    Io(std::io::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Label(err) => write!(f, "{}", err),
            Self::Runtime(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<crate::label::LabelError> for AppError {
    fn from(err: crate::label::LabelError) -> Self {
        AppError::Label(err)
    }
}

impl From<crate::error::runtime::RuntimeError> for AppError {
    fn from(err: crate::error::runtime::RuntimeError) -> Self {
        AppError::Runtime(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}
