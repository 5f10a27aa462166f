//! The event ingestor: bootstraps the registry from currently-running
//! containers, then keeps it in sync with the runtime's event stream.
//!
//! Bootstrap and the event loop both funnel through [`derive_container`],
//! which turns an inspect document (plus, during bootstrap, the matching
//! list entry) into a single [`Container`] record carrying every DNS name
//! it should answer to: its sanitized primary name, any docker-compose
//! service/project aliases, and any `VIRTUAL_HOST` names. One container can
//! answer to several names at once, but it only ever has one registry
//! mapping key — its primary name — so a `rename` event only has one
//! mapping to find.

use std::collections::HashMap;
use std::sync::OnceLock;

use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessageTypeEnum};
use futures::StreamExt;
use regex::Regex;

use crate::container::Container;
use crate::error::runtime::RuntimeError;
use crate::label::Label;
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;

fn valid_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w.-]").unwrap())
}

fn sanitize_name(raw: &str) -> String {
    valid_name_pattern()
        .replace_all(raw, "")
        .trim_end_matches('.')
        .to_string()
}

fn with_domain(name: &str, domain: Option<&str>) -> String {
    match domain {
        Some(d) if !d.is_empty() => format!("{name}.{d}"),
        _ => name.to_string(),
    }
}

fn parse_virtual_hosts(env: &[String]) -> Vec<String> {
    for line in env {
        if let Some((key, value)) = line.split_once('=') {
            if key == "VIRTUAL_HOST" {
                return value
                    .split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect();
            }
        }
    }
    Vec::new()
}

fn derive_addresses(inspect: &ContainerInspectResponse, list_entry: Option<&ContainerSummary>) -> Vec<String> {
    if let Some(networks) = inspect.network_settings.as_ref().and_then(|ns| ns.networks.as_ref()) {
        let addrs: Vec<String> = networks
            .values()
            .filter_map(|endpoint| endpoint.ip_address.clone())
            .filter(|addr| !addr.is_empty())
            .collect();
        if !addrs.is_empty() {
            return addrs;
        }
    }

    if let Some(addr) = inspect.network_settings.as_ref().and_then(|ns| ns.ip_address.clone()) {
        if !addr.is_empty() {
            return vec![addr];
        }
    }

    if let Some(entry) = list_entry {
        let mode = entry.host_config.as_ref().and_then(|hc| hc.network_mode.clone());
        if let Some(mode) = mode {
            let addr = entry
                .network_settings
                .as_ref()
                .and_then(|ns| ns.networks.as_ref())
                .and_then(|nets| nets.get(&mode))
                .and_then(|endpoint| endpoint.ip_address.clone());
            if let Some(addr) = addr {
                if !addr.is_empty() {
                    return vec![addr];
                }
            }
        }
    }

    Vec::new()
}

/// Turns an inspect document into a `Container` record carrying every name
/// it should answer to. Fails if the document is missing its id or if the
/// sanitized primary name doesn't parse as a DNS label; a derived alias or
/// `VIRTUAL_HOST` entry that fails to parse is only ever logged and
/// skipped, since those are enrichments rather than the container's
/// identity.
pub fn derive_container(
    inspect: &ContainerInspectResponse,
    list_entry: Option<&ContainerSummary>,
    domain: Option<&str>,
) -> crate::error::app::Result<Container> {
    let id = inspect
        .id
        .clone()
        .ok_or_else(|| RuntimeError::MissingField("Id".to_string()))?;

    let running = inspect
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false);

    let raw_name = inspect.name.clone().unwrap_or_default();
    let sanitized = sanitize_name(&raw_name);
    let primary = with_domain(&sanitized, domain);
    let primary_label = Label::parse(&primary)?;

    let labels: HashMap<String, String> = inspect
        .config
        .as_ref()
        .and_then(|c| c.labels.clone())
        .unwrap_or_default();

    let mut derived_names = Vec::new();
    let service = labels.get("com.docker.compose.service");
    let project = labels.get("com.docker.compose.project");
    if let (Some(service), Some(project)) = (service, project) {
        let number: u32 = labels
            .get("com.docker.compose.container-number")
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
        derived_names.push(with_domain(&format!("{number}.{service}.{project}"), domain));
        if number == 1 {
            derived_names.push(with_domain(&format!("{service}.{project}"), domain));
        }
    }

    let envs = inspect.config.as_ref().and_then(|c| c.env.clone()).unwrap_or_default();
    let virtual_hosts = parse_virtual_hosts(&envs);

    let mut names = vec![primary_label];
    for candidate in derived_names.iter().chain(virtual_hosts.iter()) {
        if let Ok(label) = Label::parse(candidate) {
            names.push(label);
        } else {
            log::debug!("[ingest] skipping unparseable derived name: {}", candidate);
        }
    }

    let addrs = derive_addresses(inspect, list_entry);

    Ok(Container {
        id,
        name: primary,
        running,
        addrs,
        names,
    })
}

/// Drives bootstrap and the event loop against a registry and a
/// container-runtime handle.
pub struct Ingestor<R: ContainerRuntime> {
    runtime: R,
    registry: std::sync::Arc<Registry>,
    domain: Option<String>,
}

impl<R: ContainerRuntime> Ingestor<R> {
    pub fn new(runtime: R, registry: std::sync::Arc<Registry>, domain: Option<String>) -> Self {
        Ingestor { runtime, registry, domain }
    }

    /// Enumerates currently-known containers and installs/activates their
    /// mappings. Prefer [`Self::serve`] over calling this directly: the
    /// runtime's event stream needs to be subscribed before this runs, or a
    /// container that starts between enumeration and subscription is never
    /// observed.
    pub async fn bootstrap(&self) -> crate::error::app::Result<()> {
        let summaries = self.runtime.containers().await?;
        log::info!("[ingest] {} containers found at bootstrap", summaries.len());

        for summary in &summaries {
            let id = match &summary.id {
                Some(id) => id.clone(),
                None => continue,
            };
            let inspect = match self.runtime.inspect_container(&id).await {
                Ok(doc) => doc,
                Err(err) => {
                    log::error!("[ingest] error inspecting {}: {}", id, err);
                    continue;
                }
            };
            let container = match derive_container(&inspect, Some(summary), self.domain.as_deref()) {
                Ok(c) => c,
                Err(err) => {
                    log::error!("[ingest] error: {}", err);
                    continue;
                }
            };
            self.install(container);
        }
        Ok(())
    }

    /// Subscribes to the event stream, then bootstraps from
    /// currently-running containers, then consumes the stream until it
    /// ends or `shutdown` fires. Subscribing before enumerating closes the
    /// race window where a container starts in between — a `start` landing
    /// in that window would otherwise never be observed by either phase.
    /// `bootstrapped` is signaled once bootstrap completes, so a caller can
    /// delay anything that depends on the registry being populated (e.g.
    /// accepting DNS queries) without blocking the event subscription
    /// itself.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
        bootstrapped: tokio::sync::oneshot::Sender<()>,
    ) {
        let events = self.runtime.events();
        if let Err(err) = self.bootstrap().await {
            log::error!("[ingest] bootstrap failed: {}", err);
        }
        let _ = bootstrapped.send(());
        self.consume(events, shutdown).await;
    }

    /// Subscribes to and consumes the runtime's event stream directly,
    /// without a bootstrap phase. Exposed for callers that have already
    /// bootstrapped through some other path; [`Self::serve`] is the usual
    /// entrypoint.
    pub async fn run(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        self.consume(self.runtime.events(), shutdown).await;
    }

    /// Drains `events` until it ends or `shutdown` reports a new value,
    /// whichever comes first. The stream is only polled between events, so
    /// a shutdown signal takes effect at the next event boundary rather
    /// than interrupting one being handled.
    async fn consume(
        &self,
        mut events: futures::stream::BoxStream<'static, Result<bollard::models::EventMessage, RuntimeError>>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                next = events.next() => {
                    let event = match next {
                        Some(Ok(event)) => event,
                        Some(Err(err)) => {
                            log::error!("[ingest] error reading event stream: {}", err);
                            continue;
                        }
                        None => {
                            log::info!("[ingest] event stream ended");
                            return;
                        }
                    };
                    self.handle_event(event).await;
                }
                _ = shutdown.changed() => {
                    log::info!("[ingest] shutdown signal received, stopping event loop");
                    return;
                }
            }
        }
    }

    async fn handle_event(&self, event: bollard::models::EventMessage) {
        let is_container_event = match &event.typ {
            Some(t) => matches!(t, EventMessageTypeEnum::CONTAINER),
            None => true,
        };
        if !is_container_event {
            log::debug!("[ingest] skipped event of type {:?}", event.typ);
            return;
        }

        let id = match event.actor.as_ref().and_then(|a| a.id.clone()) {
            Some(id) => id,
            None => {
                log::debug!("[ingest] skipped event with no id");
                return;
            }
        };

        let status = match &event.action {
            Some(action) => action.clone(),
            None => {
                log::debug!("[ingest] skipped event with no status");
                return;
            }
        };
        if !matches!(status.as_str(), "start" | "die" | "rename") {
            log::debug!("[ingest] skipped event with status {}", status);
            return;
        }

        log::info!("[ingest] event status={} id={}", status, id);

        if status == "rename" {
            let attrs = event.actor.as_ref().and_then(|a| a.attributes.clone()).unwrap_or_default();
            let old_name = attrs.get("oldName").cloned().unwrap_or_default();
            let new_name = attrs.get("name").cloned().unwrap_or_default();
            self.registry.rename(&old_name, &new_name);
            return;
        }

        let inspect = match self.runtime.inspect_container(&id).await {
            Ok(doc) => doc,
            Err(err) => {
                log::error!("[ingest] error inspecting {}: {}", id, err);
                return;
            }
        };
        let container = match derive_container(&inspect, None, self.domain.as_deref()) {
            Ok(c) => c,
            Err(err) => {
                log::error!("[ingest] error: {}", err);
                return;
            }
        };

        match status.as_str() {
            "start" => self.install(container),
            "die" => self.registry.deactivate(&container),
            _ => unreachable!("status already filtered to start/die/rename"),
        }
    }

    fn install(&self, container: Container) {
        let key = self.registry.mapping_key_for_name(&container.name);
        self.registry.add(key, container.names.clone());
        if container.running {
            self.registry.activate(container);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage};
    use futures::stream::BoxStream;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct MockRuntime {
        containers: Vec<ContainerSummary>,
        inspects: std::sync::Arc<StdMutex<HashMap<String, ContainerInspectResponse>>>,
        events: StdMutex<Vec<EventMessage>>,
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
            Ok(self.containers.clone())
        }

        async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
            self.inspects
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| RuntimeError::MissingField(format!("no fixture for {id}")))
        }

        fn events(&self) -> BoxStream<'static, Result<EventMessage, RuntimeError>> {
            let queued = self.events.lock().unwrap().clone();
            futures::stream::iter(queued.into_iter().map(Ok)).boxed()
        }
    }

    fn inspect_doc(id: &str, name: &str, running: bool, ip: &str, env: Vec<&str>, labels: serde_json::Value) -> ContainerInspectResponse {
        serde_json::from_value(json!({
            "Id": id,
            "Name": format!("/{name}"),
            "State": { "Running": running },
            "Config": {
                "Env": env,
                "Labels": labels,
            },
            "NetworkSettings": {
                "Networks": { "bridge": { "IPAddress": ip } },
                "IPAddress": "",
            },
            "HostConfig": { "NetworkMode": "bridge" },
        }))
        .expect("fixture inspect document should deserialize")
    }

    fn event(status: &str, id: &str, attributes: serde_json::Value) -> EventMessage {
        serde_json::from_value(json!({
            "Type": "container",
            "Action": status,
            "Actor": { "ID": id, "Attributes": attributes },
        }))
        .expect("fixture event should deserialize")
    }

    #[test]
    fn sanitize_name_strips_leading_slash_and_invalid_chars() {
        assert_eq!(sanitize_name("/foo"), "foo");
        assert_eq!(sanitize_name("/foo_bar-1.2"), "foo_bar-1.2");
    }

    #[test]
    fn derive_container_s1_start_then_resolve() {
        let doc = inspect_doc("c1", "foo", true, "10.0.0.2", vec![], json!({}));
        let container = derive_container(&doc, None, Some("docker")).unwrap();
        assert_eq!(container.name, "foo.docker");
        assert_eq!(container.addrs, vec!["10.0.0.2".to_string()]);
        assert_eq!(container.names.len(), 1);
        assert_eq!(container.names[0].idna(), "foo.docker");
    }

    #[test]
    fn derive_container_s2_compose_derivation() {
        let doc = inspect_doc(
            "c2",
            "shop_web_1",
            true,
            "10.0.0.3",
            vec![],
            json!({
                "com.docker.compose.container-number": "1",
                "com.docker.compose.service": "web",
                "com.docker.compose.project": "shop",
            }),
        );
        let container = derive_container(&doc, None, Some("docker")).unwrap();
        let names: Vec<String> = container.names.iter().map(|n| n.idna()).collect();
        assert!(names.contains(&"shop_web_1.docker".to_string()));
        assert!(names.contains(&"1.web.shop.docker".to_string()));
        assert!(names.contains(&"web.shop.docker".to_string()));
    }

    #[test]
    fn derive_container_s3_virtual_host() {
        let doc = inspect_doc(
            "c3",
            "api",
            true,
            "10.0.0.4",
            vec!["VIRTUAL_HOST=api.example.com,*.api.example.com"],
            json!({}),
        );
        let container = derive_container(&doc, None, None).unwrap();
        let names: Vec<String> = container.names.iter().map(|n| n.idna()).collect();
        assert!(names.contains(&"api.example.com".to_string()));
        assert!(names.contains(&"*.api.example.com".to_string()));
    }

    #[tokio::test]
    async fn bootstrap_and_event_loop_drive_the_registry() {
        let c1 = inspect_doc("c1", "foo", true, "10.0.0.2", vec![], json!({}));
        let mut inspects = HashMap::new();
        inspects.insert("c1".to_string(), c1);

        let summary: ContainerSummary = serde_json::from_value(json!({ "Id": "c1" })).unwrap();

        let runtime = MockRuntime {
            containers: vec![summary],
            inspects: std::sync::Arc::new(StdMutex::new(inspects)),
            events: StdMutex::new(vec![]),
        };
        let registry = std::sync::Arc::new(Registry::new(Some("docker".to_string())));
        let ingestor = Ingestor::new(runtime, registry.clone(), Some("docker".to_string()));

        ingestor.bootstrap().await.unwrap();
        assert_eq!(
            registry.resolve(&Label::parse("foo.docker").unwrap()),
            vec!["10.0.0.2".to_string()]
        );

        let die = event("die", "c1", json!({}));
        ingestor.handle_event(die).await;
        assert!(registry.resolve(&Label::parse("foo.docker").unwrap()).is_empty());
    }

    #[tokio::test]
    async fn malformed_events_are_skipped_without_disturbing_the_registry() {
        let registry = std::sync::Arc::new(Registry::new(Some("docker".to_string())));
        let runtime = MockRuntime {
            containers: vec![],
            inspects: std::sync::Arc::new(StdMutex::new(HashMap::new())),
            events: StdMutex::new(vec![]),
        };
        let ingestor = Ingestor::new(runtime, registry.clone(), Some("docker".to_string()));

        let wrong_type: EventMessage = serde_json::from_value(json!({
            "Type": "network",
            "Action": "start",
            "Actor": { "ID": "c1" },
        }))
        .unwrap();
        let no_id: EventMessage = serde_json::from_value(json!({
            "Type": "container",
            "Action": "start",
            "Actor": {},
        }))
        .unwrap();
        let unrecognized_status = event("pause", "c1", json!({}));

        ingestor.handle_event(wrong_type).await;
        ingestor.handle_event(no_id).await;
        ingestor.handle_event(unrecognized_status).await;

        assert!(registry.resolve(&Label::parse("foo.docker").unwrap()).is_empty());
    }

    #[tokio::test]
    async fn inspect_failure_for_one_event_does_not_abort_the_loop() {
        let c1 = inspect_doc("c1", "foo", true, "10.0.0.2", vec![], json!({}));
        let mut inspects = HashMap::new();
        inspects.insert("c1".to_string(), c1);
        let runtime = MockRuntime {
            containers: vec![],
            inspects: std::sync::Arc::new(StdMutex::new(inspects)),
            events: StdMutex::new(vec![]),
        };
        let registry = std::sync::Arc::new(Registry::new(Some("docker".to_string())));
        let ingestor = Ingestor::new(runtime, registry.clone(), Some("docker".to_string()));

        ingestor.handle_event(event("start", "missing-id", json!({}))).await;
        assert!(registry.resolve(&Label::parse("foo.docker").unwrap()).is_empty());

        ingestor.handle_event(event("start", "c1", json!({}))).await;
        assert_eq!(
            registry.resolve(&Label::parse("foo.docker").unwrap()),
            vec!["10.0.0.2".to_string()]
        );
    }

    #[tokio::test]
    async fn rename_event_moves_the_mapping_key() {
        let c1 = inspect_doc("c1", "foo", true, "10.0.0.2", vec![], json!({}));
        let mut inspects = HashMap::new();
        inspects.insert("c1".to_string(), c1);
        let runtime = MockRuntime {
            containers: vec![],
            inspects: std::sync::Arc::new(StdMutex::new(inspects)),
            events: StdMutex::new(vec![]),
        };
        let registry = std::sync::Arc::new(Registry::new(Some("docker".to_string())));
        let ingestor = Ingestor::new(runtime, registry.clone(), Some("docker".to_string()));

        let start = event("start", "c1", json!({}));
        ingestor.handle_event(start).await;
        assert_eq!(registry.get("name:/foo.docker"), vec!["foo.docker".to_string()]);

        let rename = event("rename", "c1", json!({ "oldName": "foo", "name": "bar" }));
        ingestor.handle_event(rename).await;
        assert!(registry.get("name:/foo.docker").is_empty());
        assert_eq!(registry.get("name:/bar.docker"), vec!["foo.docker".to_string()]);
    }

    #[tokio::test]
    async fn rename_then_die_cleans_up_the_old_tagged_tree_entries() {
        let c1 = inspect_doc("c1", "foo", true, "10.0.0.2", vec![], json!({}));
        let mut inspects = HashMap::new();
        inspects.insert("c1".to_string(), c1);
        let inspects = std::sync::Arc::new(StdMutex::new(inspects));
        let runtime = MockRuntime {
            containers: vec![],
            inspects: inspects.clone(),
            events: StdMutex::new(vec![]),
        };
        let registry = std::sync::Arc::new(Registry::new(Some("docker".to_string())));
        let ingestor = Ingestor::new(runtime, registry.clone(), Some("docker".to_string()));

        ingestor.handle_event(event("start", "c1", json!({}))).await;
        assert_eq!(
            registry.resolve(&Label::parse("foo.docker").unwrap()),
            vec!["10.0.0.2".to_string()]
        );

        ingestor
            .handle_event(event("rename", "c1", json!({ "oldName": "foo", "name": "bar" })))
            .await;
        // the names still resolve: tree entries installed under the old key
        // are left in place until the container's next `die`, per spec.
        assert_eq!(
            registry.resolve(&Label::parse("foo.docker").unwrap()),
            vec!["10.0.0.2".to_string()]
        );

        // the runtime's own inspect already reflects the rename by the time
        // a `die` event arrives for this container.
        let renamed = inspect_doc("c1", "bar", false, "10.0.0.2", vec![], json!({}));
        inspects.lock().unwrap().insert("c1".to_string(), renamed);

        ingestor.handle_event(event("die", "c1", json!({}))).await;

        assert!(registry.resolve(&Label::parse("foo.docker").unwrap()).is_empty());
    }

    struct PendingRuntime;

    #[async_trait]
    impl ContainerRuntime for PendingRuntime {
        async fn containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
            Ok(vec![])
        }

        async fn inspect_container(&self, _id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
            Err(RuntimeError::MissingField("unused".to_string()))
        }

        fn events(&self) -> BoxStream<'static, Result<EventMessage, RuntimeError>> {
            futures::stream::pending().boxed()
        }
    }

    #[tokio::test]
    async fn run_stops_at_the_next_boundary_after_shutdown_is_signaled() {
        let registry = std::sync::Arc::new(Registry::new(None));
        let ingestor = std::sync::Arc::new(Ingestor::new(PendingRuntime, registry, None));
        let (tx, rx) = tokio::sync::watch::channel(false);

        let task_ingestor = ingestor.clone();
        let handle = tokio::spawn(async move { task_ingestor.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("run should stop promptly once shutdown is signaled")
            .expect("event loop task should not panic");
    }
}
