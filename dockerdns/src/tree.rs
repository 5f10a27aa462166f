//! The hierarchical name tree that backs address resolution.
//!
//! Every DNS label is a node; a node's children are keyed by the next label
//! moving away from the root. A node may carry a list of address links
//! (tagged by the mapping key that installed them) and, separately, a
//! wildcard flag set when a `*` child was registered under it — wildcard
//! links live directly on the parent node rather than as a literal `"*"`
//! child, since `*` never has children of its own.
//!
//! Lookups walk the tree one label at a time, consuming the most specific
//! match first and falling back to a wildcard a level up when nothing more
//! specific is found. Each node keeps a small round-robin cursor so that
//! repeated lookups of the same name cycle through its address links rather
//! than always returning them in the same order.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLink {
    pub address: String,
    pub tag: Option<String>,
}

#[derive(Debug, Default)]
pub struct Node {
    children: HashMap<String, Node>,
    addrs: Vec<AddressLink>,
    wildcard: bool,
    cursor: usize,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: &crate::label::Label, address: impl Into<String>, tag: Option<String>) {
        let mut path = name.tree_path();
        self.put_rec(&mut path, address.into(), tag);
    }

    pub fn get(&mut self, name: &crate::label::Label) -> Vec<AddressLink> {
        let mut path = name.tree_path();
        self.get_rec(&mut path)
    }

    /// Removes links under `name`. If `tag` is given, only links installed
    /// under that tag are eligible; if `addresses` is given, only links
    /// whose address appears in the set are eligible. Returns the set of
    /// addresses actually removed.
    pub fn remove(
        &mut self,
        name: &crate::label::Label,
        tag: Option<&str>,
        addresses: Option<&HashSet<String>>,
    ) -> HashSet<String> {
        let mut path = name.tree_path();
        self.remove_rec(&mut path, tag, addresses)
    }

    pub fn to_dict(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            ":addr".to_string(),
            serde_json::json!(self
                .addrs
                .iter()
                .map(|l| serde_json::json!([l.address, l.tag]))
                .collect::<Vec<_>>()),
        );
        map.insert(":wildcard".to_string(), serde_json::json!(self.wildcard));
        for (label, child) in &self.children {
            map.insert(label.clone(), child.to_dict());
        }
        serde_json::Value::Object(map)
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.addrs.is_empty()
    }

    fn rotate_addrs(&mut self) -> Vec<AddressLink> {
        if self.addrs.is_empty() {
            return Vec::new();
        }
        self.cursor %= self.addrs.len();
        let mut rotated = Vec::with_capacity(self.addrs.len());
        rotated.extend_from_slice(&self.addrs[self.cursor..]);
        rotated.extend_from_slice(&self.addrs[..self.cursor]);
        self.cursor = (self.cursor + 1) % self.addrs.len();
        rotated
    }

    fn get_rec(&mut self, path: &mut Vec<String>) -> Vec<AddressLink> {
        if let Some(part) = path.pop() {
            if let Some(sub) = self.children.get_mut(&part) {
                let found = sub.get_rec(path);
                if !found.is_empty() {
                    return found;
                }
            }
        }
        self.rotate_addrs()
    }

    fn put_rec(&mut self, path: &mut Vec<String>, address: String, tag: Option<String>) {
        let part = match path.pop() {
            Some(p) => p,
            None => return,
        };
        let link = AddressLink { address, tag };
        if part == "*" {
            self.wildcard = true;
            self.addrs.push(link);
            return;
        }
        let sub = self.children.entry(part).or_insert_with(Node::new);
        if path.is_empty() {
            sub.addrs.push(link);
            return;
        }
        sub.put_rec(path, link.address, link.tag);
    }

    fn remove_rec(
        &mut self,
        path: &mut Vec<String>,
        tag: Option<&str>,
        addresses: Option<&HashSet<String>>,
    ) -> HashSet<String> {
        let part = match path.pop() {
            Some(p) => p,
            None => return HashSet::new(),
        };

        if !path.is_empty() {
            let removed = match self.children.get_mut(&part) {
                Some(sub) => sub.remove_rec(path, tag, addresses),
                None => return HashSet::new(),
            };
            if let Some(sub) = self.children.get(&part) {
                if sub.is_empty() {
                    self.children.remove(&part);
                }
            }
            return removed;
        }

        if part == "*" {
            let removed = Self::remove_matching(&mut self.addrs, tag, addresses);
            self.wildcard = !self.addrs.is_empty();
            removed
        } else if let Some(sub) = self.children.get_mut(&part) {
            let removed = Self::remove_matching(&mut sub.addrs, tag, addresses);
            if sub.is_empty() {
                self.children.remove(&part);
            }
            removed
        } else {
            HashSet::new()
        }
    }

    fn remove_matching(
        addrs: &mut Vec<AddressLink>,
        tag: Option<&str>,
        addresses: Option<&HashSet<String>>,
    ) -> HashSet<String> {
        let mut removed = HashSet::new();
        addrs.retain(|link| {
            let tag_matches = match tag {
                Some(t) => link.tag.as_deref() == Some(t),
                None => true,
            };
            let addr_matches = match addresses {
                Some(set) => set.contains(&link.address),
                None => true,
            };
            if tag_matches && addr_matches {
                removed.insert(link.address.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}
