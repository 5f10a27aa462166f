//! Abstraction over the container runtime the event ingestor watches.
//!
//! The ingestor is written against [`ContainerRuntime`] rather than the
//! `bollard` client directly, so tests can drive it with a scripted mock
//! rather than a real Docker Engine API socket. Production wiring uses
//! [`bollard_client::BollardRuntime`].

pub mod bollard_client;

use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage};
use futures::stream::BoxStream;

use crate::error::runtime::RuntimeError;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// The current list of containers, running or not.
    async fn containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Full inspect document for a single container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError>;

    /// A live stream of container lifecycle events (start/die/rename and
    /// others the ingestor filters out).
    fn events(&self) -> BoxStream<'static, Result<EventMessage, RuntimeError>>;
}
