//! DNS-layer errors and their mapping to response codes.
//!
//! The responder is authoritative for every name it is asked about (it
//! never rejects a zone outright, unlike a classic split-horizon
//! authority) so the only response codes this layer produces are NOERROR,
//! with or without answers, and SERVFAIL for requests the handler itself
//! could not process.

use hickory_server::proto::op::{MessageType, OpCode};

/// Errors produced while validating or answering a single DNS request.
///
/// ## Response Code Mapping
///
/// `DnsHandler::handle_request` catches every variant at the top level and
/// maps it to SERVFAIL — this responder has nothing resembling an
/// NXDOMAIN-worthy client error, since it answers authoritatively for any
/// name that happens to match the registry and NOERROR-with-no-answer for
/// everything else (§4.D). A `DNSError` only ever means the handler itself
/// could not finish building a response.
#[derive(Debug)]
pub enum DNSError {
    /// Anything other than a standard query opcode (update, notify, ...).
    ///
    /// ## Response mapping
    /// SERVFAIL — this responder only implements ordinary queries.
    InvalidOpCode(OpCode),
    /// A response packet arriving on the query socket.
    ///
    /// ## Response mapping
    /// SERVFAIL — there is no request here to answer.
    InvalidMessageType(MessageType),
    /// Sending the reply datagram failed (socket error, peer gone).
    ///
    /// ## Response mapping
    /// SERVFAIL, though the client will generally never see it: the
    /// failure is in the send itself.
    Io(std::io::Error),
    /// An [`crate::error::app::AppError`] surfaced while resolving a query
    /// (registry, resolver, or runtime failure upstream of the wire
    /// protocol).
    ///
    /// ## Response mapping
    /// SERVFAIL — the underlying cause is logged at the `From` conversion
    /// site; only the message reaches the wire-protocol layer.
    Internal(String),
}

impl std::fmt::Display for DNSError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOpCode(op) => write!(f, "unsupported DNS opcode: {:?}", op),
            Self::InvalidMessageType(mt) => write!(f, "unexpected DNS message type: {:?}", mt),
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for DNSError {}

impl From<std::io::Error> for DNSError {
    fn from(err: std::io::Error) -> Self {
        DNSError::Io(err)
    }
}

impl From<crate::error::app::AppError> for DNSError {
    fn from(err: crate::error::app::AppError) -> Self {
        DNSError::Internal(err.to_string())
    }
}
