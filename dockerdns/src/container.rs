//! The container record derived from container-runtime inspect data.
//!
//! This is the shape the event ingestor hands to the registry once it has
//! resolved a container's names and addresses; it deliberately carries no
//! runtime-client types so the registry stays decoupled from `bollard`.

use crate::label::Label;

#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub addrs: Vec<String>,
    pub names: Vec<Label>,
}

impl Container {
    pub fn name_key(&self) -> String {
        format!("name:/{}", self.name)
    }

    pub fn id_key(&self) -> String {
        format!("id:/{}", self.id)
    }
}
