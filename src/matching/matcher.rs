/*!
 * Dependency Matcher
 * Decides whether a host satisfies an implementation's property
 * dependencies, and builds the capacity requests for external properties
 */

use crate::descriptor::{
    ComparisonAction, DependencyRef, DependencyValue, Implementation, OsConstraint, Property,
    PropertyCatalog, PropertyKinds, PropertyValue, SimpleValue, StructValue,
};
use crate::matching::compare::compare_values;
use crate::matching::formula::{self, is_dynamic};
use crate::matching::PropertyMatchingError;
use log::{debug, warn};
use std::collections::HashMap;

/// Well-known allocation property names used for implementation placement.
pub const PROCESSOR_NAME: &str = "processor_name";
pub const OS_NAME: &str = "os_name";
pub const OS_VERSION: &str = "os_version";

fn allocation_property<'a>(host: &'a PropertyCatalog, id: &str) -> Option<&'a Property> {
    host.get(id).filter(|p| p.is_kind(PropertyKinds::ALLOCATION))
}

/// Boolean entry point: does the host satisfy every matching dependency?
///
/// Every comparison puts the host's allocation value on the left and the
/// dependency value on the right. Evaluation short-circuits on the first
/// failed dependency. A host with no allocation properties rejects any
/// non-empty dependency list outright.
pub fn is_allocation_satisfied(host: &PropertyCatalog, deps: &[DependencyRef]) -> bool {
    if deps.is_empty() {
        return true;
    }
    if !host.has_allocation() {
        debug!("host offers no allocation properties, rejecting {} dependencies", deps.len());
        return false;
    }

    for dep in deps {
        let Some(prop) = allocation_property(host, &dep.property_id) else {
            debug!("no allocation property {} on host", dep.property_id);
            return false;
        };
        if prop.action == ComparisonAction::External {
            // Satisfied by capacity allocation, not by comparison
            continue;
        }
        let Some(host_value) = prop.simple_value() else {
            warn!("allocation property {} has no value to compare", prop.id);
            return false;
        };
        let DependencyValue::Simple(literal) = &dep.value else {
            warn!(
                "dependency {} carries struct data against a comparison property",
                dep.property_id
            );
            return false;
        };
        if is_dynamic(literal) {
            warn!(
                "dependency {} uses a capacity formula against a comparison property",
                dep.property_id
            );
            return false;
        }
        let Ok(dep_value) = SimpleValue::parse(prop.scalar_type, literal) else {
            warn!(
                "dependency value {:?} does not parse as {} for {}",
                literal, prop.scalar_type, prop.id
            );
            return false;
        };
        if !compare_values(host_value, &dep_value, prop.action) {
            debug!(
                "dependency {} failed: {} {} {}",
                prop.id,
                host_value.render(),
                prop.action,
                dep_value.render()
            );
            return false;
        }
    }
    true
}

fn external_simple(
    prop: &Property,
    literal: &str,
    configure: &HashMap<String, SimpleValue>,
) -> Result<SimpleValue, PropertyMatchingError> {
    if is_dynamic(literal) {
        let result = formula::evaluate_dynamic(literal, configure)?;
        return SimpleValue::from_f64(prop.scalar_type, result).map_err(|e| {
            PropertyMatchingError::BadDependencyValue {
                id: prop.id.clone(),
                reason: e.to_string(),
            }
        });
    }
    SimpleValue::parse(prop.scalar_type, literal).map_err(|e| {
        PropertyMatchingError::BadDependencyValue {
            id: prop.id.clone(),
            reason: e.to_string(),
        }
    })
}

fn external_struct(
    prop: &Property,
    fields: &[(String, String)],
    configure: &HashMap<String, SimpleValue>,
) -> Result<StructValue, PropertyMatchingError> {
    // Start from the host's declared fields so unnamed ones keep their
    // defaults, then overlay the requested fields.
    let mut value = prop
        .value
        .as_ref()
        .and_then(PropertyValue::as_struct)
        .cloned()
        .unwrap_or_default();

    for (field_id, literal) in fields {
        let Some(existing) = value.get(field_id) else {
            return Err(PropertyMatchingError::BadDependencyValue {
                id: prop.id.clone(),
                reason: format!("unknown struct field {field_id}"),
            });
        };
        let field_type = existing.scalar_type();
        let field_value = if is_dynamic(literal) {
            let result = formula::evaluate_dynamic(literal, configure)?;
            SimpleValue::from_f64(field_type, result).map_err(|e| {
                PropertyMatchingError::BadDependencyValue {
                    id: prop.id.clone(),
                    reason: e.to_string(),
                }
            })?
        } else {
            SimpleValue::parse(field_type, literal).map_err(|e| {
                PropertyMatchingError::BadDependencyValue {
                    id: prop.id.clone(),
                    reason: e.to_string(),
                }
            })?
        };
        value.set(field_id, field_value);
    }
    Ok(value)
}

/// Fatal entry point: build the capacity request for the external
/// properties among the dependencies. Comparison-action dependencies are
/// assumed already checked and are skipped. Any structural problem is an
/// error, not a mismatch.
pub fn build_capacity_request(
    host: &PropertyCatalog,
    deps: &[DependencyRef],
    configure: &HashMap<String, SimpleValue>,
) -> Result<Vec<(String, PropertyValue)>, PropertyMatchingError> {
    if deps.is_empty() {
        return Ok(Vec::new());
    }
    if !host.has_allocation() {
        return Err(PropertyMatchingError::NoAllocationCatalog);
    }

    let mut request = Vec::new();
    for dep in deps {
        let prop = allocation_property(host, &dep.property_id).ok_or_else(|| {
            PropertyMatchingError::MissingAllocationProperty {
                id: dep.property_id.clone(),
            }
        })?;
        if prop.action != ComparisonAction::External {
            continue;
        }

        let value = match (&dep.value, &prop.value) {
            (DependencyValue::Struct(fields), _) if prop.value.as_ref().map_or(true, |v| v.as_struct().is_some()) => {
                PropertyValue::Struct(external_struct(prop, fields, configure)?)
            }
            (DependencyValue::Simple(literal), _) => {
                PropertyValue::Simple(external_simple(prop, literal, configure)?)
            }
            (DependencyValue::Struct(_), _) => {
                return Err(PropertyMatchingError::BadDependencyValue {
                    id: prop.id.clone(),
                    reason: "struct value against a simple property".to_string(),
                })
            }
        };
        request.push((prop.id.clone(), value));
    }
    Ok(request)
}

fn named_constraint_holds(host: &PropertyCatalog, name: &str, literal: &str) -> bool {
    let mut found_named = false;
    for prop in host.of_kind(PropertyKinds::ALLOCATION) {
        if prop.display_name() != name {
            continue;
        }
        found_named = true;
        let Some(host_value) = prop.simple_value() else {
            continue;
        };
        let Ok(constraint) = SimpleValue::parse(prop.scalar_type, literal) else {
            continue;
        };
        if compare_values(host_value, &constraint, prop.action) {
            return true;
        }
    }
    if !found_named {
        debug!("host declares no {} allocation property", name);
    }
    false
}

/// Check the implementation's processor constraints against the host.
/// An empty constraint list is a wildcard; otherwise every listed value
/// must be satisfied.
pub fn check_processor(processors: &[String], host: &PropertyCatalog) -> bool {
    processors
        .iter()
        .all(|proc| named_constraint_holds(host, PROCESSOR_NAME, proc))
}

/// Check OS name/version constraints against the host. Every listed
/// constraint must hold; a version is only checked when declared.
pub fn check_os(constraints: &[OsConstraint], host: &PropertyCatalog) -> bool {
    constraints.iter().all(|os| {
        named_constraint_holds(host, OS_NAME, &os.name)
            && os
                .version
                .as_ref()
                .map_or(true, |v| named_constraint_holds(host, OS_VERSION, v))
    })
}

/// Combined placement gate used by implementation selection.
pub fn check_processor_and_os(imp: &Implementation, host: &PropertyCatalog) -> bool {
    check_processor(&imp.processors, host) && check_os(&imp.os, host)
}
