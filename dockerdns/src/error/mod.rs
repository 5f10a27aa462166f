//! Per-layer error types and their conversions.
//!
//! Each transport or subsystem boundary gets its own error enum rather than
//! a single crate-wide error, so each layer can map failures to the
//! response it actually needs to produce (a DNS response code, a log line
//! and a retry, or a process-ending bail).

pub mod app;
pub mod dns;
pub mod runtime;
