//! The mutex-guarded registry of name mappings and active containers.
//!
//! A `Mapping` binds a key (`"name:/<container>"`, `"id:/<container>"` or
//! `"domain:/<label>"` for a statically pinned entry) to the set of DNS
//! names it should answer for. The registry only installs a mapping's names
//! into the lookup tree while the container they describe is active (or,
//! for static entries, unconditionally) — this mirrors the two-phase
//! add-then-activate flow the event ingestor drives.
//!
//! All mutation goes through a single lock. `add` calls `remove` before
//! taking that lock itself, so the two never deadlock against each other.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::container::Container;
use crate::label::Label;
use crate::tree::Node;

#[derive(Debug, Clone)]
struct Mapping {
    key: String,
    names: Vec<Label>,
}

struct RegistryState {
    mappings: HashMap<String, Mapping>,
    active: HashMap<String, Container>,
    tree: Node,
}

/// Shared, lock-protected registry of name mappings and active containers.
pub struct Registry {
    domain: Option<String>,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(domain: Option<String>) -> Self {
        Registry {
            domain,
            state: Mutex::new(RegistryState {
                mappings: HashMap::new(),
                active: HashMap::new(),
                tree: Node::new(),
            }),
        }
    }

    /// Normalizes a bare or partially-qualified container name into the
    /// `name:/<fqdn>` key used to index mappings, appending the configured
    /// global domain exactly once.
    pub fn mapping_key_for_name(&self, name: &str) -> String {
        let bare = name.strip_prefix("name:/").unwrap_or(name);
        let bare = bare.trim_start_matches('/');
        let qualified = match &self.domain {
            Some(domain) if !bare.is_empty() && !bare.ends_with(&format!(".{domain}")) => {
                format!("{bare}.{domain}")
            }
            _ => bare.to_string(),
        };
        format!("name:/{qualified}")
    }

    /// Registers `names` under `key`, replacing any previous mapping with
    /// the same key. If an active container's `name:/` or `id:/` key
    /// matches, its addresses are installed into the lookup tree
    /// immediately under each of `names`.
    pub fn add(&self, key: impl Into<String>, names: Vec<Label>) {
        let key = key.into();
        let key = if key.starts_with("name:/") {
            self.mapping_key_for_name(&key)
        } else {
            key
        };
        self.remove(&key);

        let mut state = self.state.lock().unwrap();
        let matching_addrs: Vec<String> = state
            .active
            .values()
            .filter(|c| c.name_key() == key || c.id_key() == key)
            .flat_map(|c| c.addrs.iter().cloned())
            .collect();

        for addr in &matching_addrs {
            for name in &names {
                state.tree.put(name, addr.clone(), Some(key.clone()));
            }
        }
        log::info!("registered mapping {} -> {:?}", key, names.iter().map(|n| n.idna()).collect::<Vec<_>>());
        state.mappings.insert(key.clone(), Mapping { key, names });
    }

    /// Removes the mapping for `key` and every address link it installed.
    /// Idempotent: removing an absent key is a no-op. `name:/`-prefixed keys
    /// are normalized the same way `add` normalizes them, so callers (the
    /// ingestor, or a REST control surface) may pass either a bare container
    /// name or a fully-qualified key.
    pub fn remove(&self, key: &str) {
        let key = if key.starts_with("name:/") {
            self.mapping_key_for_name(key)
        } else {
            key.to_string()
        };
        let mut state = self.state.lock().unwrap();
        if let Some(mapping) = state.mappings.remove(&key) {
            for name in &mapping.names {
                let removed = state.tree.remove(name, Some(mapping.key.as_str()), None);
                for addr in removed {
                    log::debug!("unregistered {} -> {} ({})", name.idna(), addr, mapping.key);
                }
            }
        }
    }

    /// Returns the canonical names registered under `key`, or an empty list
    /// if no such mapping exists.
    pub fn get(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .mappings
            .get(key)
            .map(|m| m.names.iter().map(|n| n.idna()).collect())
            .unwrap_or_default()
    }

    /// Pins a static address under `label`, independent of any container
    /// lifecycle. Used for REST-managed entries.
    pub fn activate_static(&self, label: &Label, address: impl Into<String>) {
        let tag = format!("domain:/{}", label.idna());
        let mut state = self.state.lock().unwrap();
        state.tree.put(label, address.into(), Some(tag));
    }

    pub fn deactivate_static(&self, label: &Label, address: &str) {
        let tag = format!("domain:/{}", label.idna());
        let mut state = self.state.lock().unwrap();
        let mut only = HashSet::new();
        only.insert(address.to_string());
        state.tree.remove(label, Some(tag.as_str()), Some(&only));
    }

    /// Marks `container` active: its addresses are installed under any
    /// mapping whose key matches its name or id, and it is tracked so
    /// future `add` calls for the same key pick it up automatically.
    ///
    /// Idempotent: a redelivered `start` event (or a second `activate` for a
    /// container `add`'s own reconciliation scan already picked up) removes
    /// any link it previously installed for the same `(name, address, tag)`
    /// before reinserting it, so the tree never accumulates duplicates of
    /// the same link.
    pub fn activate(&self, container: Container) {
        let mut state = self.state.lock().unwrap();
        let mapping = state
            .mappings
            .get(&container.name_key())
            .or_else(|| state.mappings.get(&container.id_key()))
            .cloned();

        if let Some(mapping) = &mapping {
            for addr in &container.addrs {
                let mut only = HashSet::new();
                only.insert(addr.clone());
                for name in &mapping.names {
                    state.tree.remove(name, Some(mapping.key.as_str()), Some(&only));
                    state.tree.put(name, addr.clone(), Some(mapping.key.clone()));
                }
            }
        }
        state.active.insert(container.id.clone(), container);
    }

    /// Marks a container inactive, removing the address links it
    /// contributed while leaving the mapping itself (and any other active
    /// container sharing it) untouched.
    ///
    /// `container` must be freshly derived from the runtime (not the stale
    /// copy cached at the last `activate`): its `name_key()`/`id_key()` is
    /// what locates the mapping to clean up, and after a `rename` the
    /// mapping now lives under the *new* key. A fresh inspect reflects that
    /// new name immediately, while the cached `active` entry still carries
    /// whatever name was current at the last `activate` call.
    pub fn deactivate(&self, container: &Container) {
        let mut state = self.state.lock().unwrap();
        if state.active.remove(&container.id).is_none() {
            return;
        }
        let mapping = state
            .mappings
            .get(&container.name_key())
            .or_else(|| state.mappings.get(&container.id_key()))
            .cloned();
        if let Some(mapping) = mapping {
            for name in &mapping.names {
                state.tree.remove(name, Some(mapping.key.as_str()), None);
            }
        }
    }

    /// Resolves `name` against the lookup tree, deduplicating addresses
    /// that reach the query through more than one tag.
    pub fn resolve(&self, name: &Label) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let links = state.tree.get(name);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for link in links {
            if seen.insert(link.address.clone()) {
                out.push(link.address);
            }
        }
        out
    }

    /// Renames the mapping for `old_name` to `new_name` in place, without
    /// touching the addresses already installed in the tree. This mirrors
    /// newer Docker API versions, which emit a `rename` event for a
    /// container whose identity (and installed links) hasn't otherwise
    /// changed.
    ///
    /// Only the dict key under which the mapping is stored moves to
    /// `new_key` — `mapping.key` itself, the tag its address links were
    /// actually installed under, is left untouched. Those links are not
    /// rewritten here, so the tag that can find and remove them later
    /// (at the container's next `die`) has to stay the one that tagged
    /// them in the first place. A subsequent `start` for the renamed
    /// container calls `add`, which always stores a mapping whose `key`
    /// matches its own dict key again, so this divergence is self-healing
    /// and only lasts until that next event.
    pub fn rename(&self, old_name: &str, new_name: &str) {
        if old_name.is_empty() || new_name.is_empty() {
            return;
        }
        let old_key = self.mapping_key_for_name(old_name);
        let new_key = self.mapping_key_for_name(new_name);
        if old_key == new_key {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(mapping) = state.mappings.remove(&old_key) {
            state.mappings.insert(new_key, mapping);
        }
    }

    /// Returns a debug snapshot of the lookup tree.
    pub fn dump(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap();
        state.tree.to_dict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn container(id: &str, name: &str, addrs: &[&str], names: &[&str]) -> Container {
        Container {
            id: id.to_string(),
            name: name.to_string(),
            running: true,
            addrs: addrs.iter().map(|s| s.to_string()).collect(),
            names: names.iter().map(|n| label(n)).collect(),
        }
    }

    #[test]
    fn mapping_key_for_name_appends_domain_once() {
        let registry = Registry::new(Some("docker".to_string()));
        assert_eq!(registry.mapping_key_for_name("foo"), "name:/foo.docker");
        assert_eq!(registry.mapping_key_for_name("foo.docker"), "name:/foo.docker");
        assert_eq!(registry.mapping_key_for_name("name:/foo"), "name:/foo.docker");
    }

    #[test]
    fn add_then_activate_resolves() {
        let registry = Registry::new(None);
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));

        assert_eq!(registry.resolve(&label("web.docker")), vec!["10.0.0.5".to_string()]);
    }

    #[test]
    fn activate_then_add_also_resolves() {
        let registry = Registry::new(None);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));
        registry.add("name:/web", vec![label("web.docker")]);

        assert_eq!(registry.resolve(&label("web.docker")), vec!["10.0.0.5".to_string()]);
    }

    #[test]
    fn deactivate_removes_links_but_keeps_mapping() {
        let registry = Registry::new(None);
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));
        registry.deactivate(&container("abc123", "web", &["10.0.0.5"], &[]));

        assert!(registry.resolve(&label("web.docker")).is_empty());
        assert_eq!(registry.get("name:/web"), vec!["web.docker".to_string()]);
    }

    #[test]
    fn activate_twice_does_not_duplicate_address_links() {
        let registry = Registry::new(None);
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));

        assert_eq!(registry.resolve(&label("web.docker")), vec!["10.0.0.5".to_string()]);
        let dump = registry.dump();
        let docker = dump.get("docker").expect("docker node");
        let web = docker.get("web").expect("web node");
        let addrs = web.get(":addr").expect("addr list").as_array().unwrap();
        assert_eq!(addrs.len(), 1, "duplicate start should upsert, not duplicate, the address link");
    }

    #[test]
    fn rename_then_die_cleans_up_links_installed_under_the_old_key() {
        let registry = Registry::new(Some("docker".to_string()));
        registry.add("name:/foo", vec![label("foo.docker")]);
        registry.activate(container("abc123", "foo.docker", &["10.0.0.5"], &[]));
        assert_eq!(registry.resolve(&label("foo.docker")), vec!["10.0.0.5".to_string()]);

        registry.rename("foo", "bar");

        // `die` always carries a freshly re-inspected container, whose name
        // already reflects the rename by the time Docker emits the event.
        registry.deactivate(&container("abc123", "bar.docker", &["10.0.0.5"], &[]));

        assert!(registry.resolve(&label("foo.docker")).is_empty());
    }

    #[test]
    fn remove_drops_the_mapping_entirely() {
        let registry = Registry::new(None);
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));
        registry.remove("name:/web");

        assert!(registry.resolve(&label("web.docker")).is_empty());
        assert!(registry.get("name:/web").is_empty());
    }

    #[test]
    fn remove_normalizes_a_bare_name_the_same_way_add_does() {
        let registry = Registry::new(Some("docker".to_string()));
        // `add` is given the bare, not-yet-domain-qualified key form; it
        // stores the mapping under the fully-qualified key, same as
        // `mapping_key_for_name` would produce.
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web.docker", &["10.0.0.5"], &[]));
        assert_eq!(registry.resolve(&label("web.docker")), vec!["10.0.0.5".to_string()]);

        // `remove` is given the same bare key form and must reach the same
        // fully-qualified mapping rather than leaving it orphaned.
        registry.remove("name:/web");

        assert!(registry.resolve(&label("web.docker")).is_empty());
        assert!(registry.get("name:/web.docker").is_empty());
    }

    #[test]
    fn rename_preserves_installed_links_under_the_new_key() {
        let registry = Registry::new(None);
        registry.add("name:/web", vec![label("web.docker")]);
        registry.activate(container("abc123", "web", &["10.0.0.5"], &[]));
        registry.rename("web", "web2");

        assert_eq!(registry.get("name:/web2"), vec!["web.docker".to_string()]);
        assert_eq!(registry.resolve(&label("web.docker")), vec!["10.0.0.5".to_string()]);
    }

    #[test]
    fn static_activation_is_independent_of_containers() {
        let registry = Registry::new(None);
        registry.activate_static(&label("pinned.docker"), "192.0.2.1");
        assert_eq!(registry.resolve(&label("pinned.docker")), vec!["192.0.2.1".to_string()]);

        registry.deactivate_static(&label("pinned.docker"), "192.0.2.1");
        assert!(registry.resolve(&label("pinned.docker")).is_empty());
    }

    #[test]
    fn resolve_deduplicates_addresses_reached_through_multiple_tags() {
        let registry = Registry::new(None);
        registry.activate_static(&label("shared.docker"), "10.0.0.9");
        registry.add("name:/shared", vec![label("shared.docker")]);
        registry.activate(container("id1", "shared", &["10.0.0.9"], &[]));

        assert_eq!(registry.resolve(&label("shared.docker")), vec!["10.0.0.9".to_string()]);
    }
}
