/*!
 * Properties
 * Property metadata, kind sets, comparison actions, and the per-unit catalog
 */

use crate::descriptor::value::{PropertyValue, ScalarType, SimpleValue};
use bitflags::bitflags;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

bitflags! {
    /// The roles a property plays (a property may carry several).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyKinds: u16 {
        const CONFIGURE   = 1 << 0;
        const EXECPARAM   = 1 << 1;
        const ALLOCATION  = 1 << 2;
        const FACTORYPARAM = 1 << 3;
        const TEST        = 1 << 4;
        const EVENT       = 1 << 5;
        const MESSAGE     = 1 << 6;
        const PROPERTY    = 1 << 7;
    }
}

impl Default for PropertyKinds {
    fn default() -> Self {
        PropertyKinds::CONFIGURE
    }
}

impl Serialize for PropertyKinds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for PropertyKinds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u16::deserialize(deserializer)?;
        Ok(Self::from_bits_retain(bits))
    }
}

/// Read/write access declared for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

/// How an allocation property participates in dependency matching.
///
/// `External` means the property is not compared at all: the dependency
/// value is *taken* as a capacity request against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonAction {
    #[default]
    External,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl fmt::Display for ComparisonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparisonAction::External => "external",
            ComparisonAction::Eq => "eq",
            ComparisonAction::Ne => "ne",
            ComparisonAction::Gt => "gt",
            ComparisonAction::Lt => "lt",
            ComparisonAction::Ge => "ge",
            ComparisonAction::Le => "le",
        };
        f.write_str(name)
    }
}

/// One declared property with its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: AccessMode,
    #[serde(default)]
    pub action: ComparisonAction,
    #[serde(default)]
    pub kinds: PropertyKinds,
    pub scalar_type: ScalarType,
    #[serde(default)]
    pub value: Option<PropertyValue>,
}

impl Property {
    pub fn simple(id: impl Into<String>, value: SimpleValue) -> Self {
        Property {
            id: id.into(),
            name: None,
            mode: AccessMode::ReadWrite,
            action: ComparisonAction::External,
            kinds: PropertyKinds::default(),
            scalar_type: value.scalar_type(),
            value: Some(PropertyValue::Simple(value)),
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_kind(&self, kind: PropertyKinds) -> bool {
        self.kinds.intersects(kind)
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }

    pub fn simple_value(&self) -> Option<&SimpleValue> {
        self.value.as_ref().and_then(PropertyValue::as_simple)
    }
}

/// Ordered, id-unique collection of properties for one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyCatalog {
    props: Vec<Property>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for PropertyCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.props == other.props
    }
}

impl PropertyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Append a property. The id must be unused.
    pub fn insert(&mut self, prop: Property) -> Result<(), String> {
        if self.lookup(&prop.id).is_some() {
            return Err(prop.id);
        }
        self.index.insert(prop.id.clone(), self.props.len());
        self.props.push(prop);
        Ok(())
    }

    fn lookup(&self, id: &str) -> Option<usize> {
        if self.index.len() == self.props.len() {
            return self.index.get(id).copied();
        }
        // Deserialized catalogs arrive without the index
        self.props.iter().position(|p| p.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Property> {
        self.lookup(id).map(|i| &self.props[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Property> {
        self.lookup(id).map(move |i| &mut self.props[i])
    }

    /// Find a property by display name; used for the processor/OS checks.
    pub fn get_by_name(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| p.display_name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.props.iter()
    }

    pub fn of_kind(&self, kind: PropertyKinds) -> impl Iterator<Item = &Property> {
        self.props.iter().filter(move |p| p.is_kind(kind))
    }

    /// True if no property in the catalog carries the allocation kind.
    pub fn has_allocation(&self) -> bool {
        self.props
            .iter()
            .any(|p| p.is_kind(PropertyKinds::ALLOCATION))
    }

    /// Merge another catalog into this one. Properties with new ids are
    /// appended; same-id properties have their value overridden unless the
    /// existing property is read-only, which only earns a warning.
    pub fn join(&mut self, other: PropertyCatalog) {
        for incoming in other.props {
            match self.get_mut(&incoming.id) {
                Some(existing) => {
                    if existing.is_read_only() {
                        warn!(
                            "property {} is read-only, keeping existing value",
                            existing.id
                        );
                        continue;
                    }
                    existing.value = incoming.value;
                }
                None => {
                    self.index.insert(incoming.id.clone(), self.props.len());
                    self.props.push(incoming);
                }
            }
        }
    }

    /// Snapshot of simple configure-kind values keyed by id; the input to
    /// capacity formula evaluation.
    pub fn configure_snapshot(&self) -> HashMap<String, SimpleValue> {
        self.of_kind(PropertyKinds::CONFIGURE | PropertyKinds::PROPERTY)
            .filter_map(|p| p.simple_value().map(|v| (p.id.clone(), v.clone())))
            .collect()
    }
}

impl FromIterator<Property> for PropertyCatalog {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut catalog = PropertyCatalog::new();
        for prop in iter {
            if let Err(id) = catalog.insert(prop) {
                warn!("dropping duplicate property {}", id);
            }
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(id: &str, value: i32) -> Property {
        Property::simple(id, SimpleValue::Long(value))
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut catalog = PropertyCatalog::new();
        catalog.insert(prop("a", 1)).unwrap();
        assert!(catalog.insert(prop("a", 2)).is_err());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_join_overrides_writable() {
        let mut base = PropertyCatalog::new();
        base.insert(prop("a", 1)).unwrap();
        let mut overlay = PropertyCatalog::new();
        overlay.insert(prop("a", 9)).unwrap();
        overlay.insert(prop("b", 2)).unwrap();

        base.join(overlay);
        assert_eq!(base.get("a").unwrap().simple_value(), Some(&SimpleValue::Long(9)));
        assert_eq!(base.get("b").unwrap().simple_value(), Some(&SimpleValue::Long(2)));
    }

    #[test]
    fn test_join_keeps_read_only() {
        let mut base = PropertyCatalog::new();
        let mut ro = prop("a", 1);
        ro.mode = AccessMode::ReadOnly;
        base.insert(ro).unwrap();

        let mut overlay = PropertyCatalog::new();
        overlay.insert(prop("a", 9)).unwrap();
        base.join(overlay);

        assert_eq!(base.get("a").unwrap().simple_value(), Some(&SimpleValue::Long(1)));
    }

    #[test]
    fn test_get_by_name_prefers_display_name() {
        let mut catalog = PropertyCatalog::new();
        let mut p = prop("DCE:proc", 0);
        p.name = Some("processor_name".to_string());
        catalog.insert(p).unwrap();
        assert!(catalog.get_by_name("processor_name").is_some());
        assert!(catalog.get_by_name("DCE:proc").is_none());
    }
}
