//! The production [`ContainerRuntime`] adapter, backed by `bollard`.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::runtime::RuntimeError;

use super::ContainerRuntime;

pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    /// Connects to the configured runtime endpoint, or the platform default
    /// (`DOCKER_HOST`, or the local Unix socket / named pipe) when none is
    /// given.
    pub fn connect(endpoint: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match endpoint {
            Some(endpoint) => {
                Docker::connect_with_http(endpoint, 120, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(BollardRuntime { docker })
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    /// Currently-*running* containers only, per bootstrap's job of seeding
    /// the registry from the already-live fleet — `all: false` (the
    /// default) excludes stopped containers, which bootstrap has no need to
    /// derive a dormant mapping for.
    async fn containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String>::default();
        Ok(self.docker.list_containers(Some(options)).await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        Ok(self.docker.inspect_container(id, None).await?)
    }

    fn events(&self) -> BoxStream<'static, Result<EventMessage, RuntimeError>> {
        let stream = self.docker.events(None::<EventsOptions<String>>);
        stream.map(|item| item.map_err(RuntimeError::from)).boxed()
    }
}
