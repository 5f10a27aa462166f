//! An authoritative DNS responder for container workloads: it watches a
//! container runtime's event stream and answers queries for container
//! names with their current addresses, falling back to a recursive
//! resolver for anything it doesn't know about.

pub mod commands;
pub mod container;
pub mod dns_server;
pub mod error;
pub mod ingest;
pub mod label;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod tree;
