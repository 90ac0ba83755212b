/*!
 * Node Configuration
 * The node's deployment document: which components to place, with what
 * instance overrides, logging directives, and start ordering
 */

use serde::{Deserialize, Serialize};

/// Instance-level value override from the node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    Simple(String),
    Sequence(Vec<String>),
    Struct(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyOverride {
    pub id: String,
    pub value: OverrideValue,
}

/// Per-instance logging directive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoggingDirective {
    #[serde(default)]
    pub config_uri: Option<String>,
    /// Symbolic or numeric level, resolved to a single digit at launch.
    #[serde(default)]
    pub level: Option<String>,
}

/// One component instance to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstantiation {
    pub id: String,
    #[serde(default)]
    pub usage_name: Option<String>,
    #[serde(default)]
    pub naming_service_name: Option<String>,
    #[serde(default)]
    pub overrides: Vec<PropertyOverride>,
    #[serde(default)]
    pub start_order: Option<i32>,
    #[serde(default)]
    pub logging: Option<LoggingDirective>,
    /// CPU affinity request, honored best-effort at launch.
    #[serde(default)]
    pub affinity: Option<Vec<u32>>,
}

impl ComponentInstantiation {
    /// Human-facing label, falling back to the instantiation id.
    pub fn label(&self) -> &str {
        self.usage_name
            .as_deref()
            .or(self.naming_service_name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// One placement: a package file plus the instances to create from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlacement {
    pub package_file: String,
    /// Instantiation id of the composite host this placement deploys into.
    #[serde(default)]
    pub composite_part_of: Option<String>,
    pub instantiations: Vec<ComponentInstantiation>,
}

/// The node configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfiguration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub placements: Vec<ComponentPlacement>,
}

impl NodeConfiguration {
    /// Find the placement that declares the given instantiation id.
    pub fn placement_of(&self, instantiation_id: &str) -> Option<&ComponentPlacement> {
        self.placements
            .iter()
            .find(|p| p.instantiations.iter().any(|i| i.id == instantiation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_fallback_chain() {
        let mut inst = ComponentInstantiation {
            id: "DCE:inst".to_string(),
            usage_name: None,
            naming_service_name: None,
            overrides: vec![],
            start_order: None,
            logging: None,
            affinity: None,
        };
        assert_eq!(inst.label(), "DCE:inst");
        inst.naming_service_name = Some("ns_name".to_string());
        assert_eq!(inst.label(), "ns_name");
        inst.usage_name = Some("usage".to_string());
        assert_eq!(inst.label(), "usage");
    }
}
