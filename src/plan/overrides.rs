/*!
 * Instance Overrides
 * Applies node-configuration property overrides onto a merged catalog
 */

use crate::descriptor::{
    OverrideValue, PropertyCatalog, PropertyOverride, PropertyValue, ScalarType, SimpleValue,
    StructValue,
};
use crate::matching::formula::{self, is_dynamic};
use log::warn;

fn resolve_literal(
    catalog: &PropertyCatalog,
    id: &str,
    ty: ScalarType,
    literal: &str,
) -> Option<SimpleValue> {
    if is_dynamic(literal) {
        // Formulas see the configure values as they stand, including the
        // effect of overrides already applied
        let snapshot = catalog.configure_snapshot();
        return match formula::evaluate_dynamic(literal, &snapshot)
            .and_then(|v| {
                SimpleValue::from_f64(ty, v).map_err(|e| {
                    crate::matching::PropertyMatchingError::BadDependencyValue {
                        id: id.to_string(),
                        reason: e.to_string(),
                    }
                })
            }) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("override formula for {} rejected: {}", id, e);
                None
            }
        };
    }
    match SimpleValue::parse(ty, literal) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("override for {} rejected: {}", id, e);
            None
        }
    }
}

fn merge_struct_override(
    catalog: &PropertyCatalog,
    id: &str,
    existing: Option<&StructValue>,
    fields: &[(String, String)],
) -> Option<StructValue> {
    let mut value = existing.cloned().unwrap_or_default();
    for (field_id, literal) in fields {
        let Some(current) = value.get(field_id) else {
            warn!("override for {} names unknown struct field {}", id, field_id);
            continue;
        };
        if let Some(resolved) = resolve_literal(catalog, id, current.scalar_type(), literal) {
            value.set(field_id, resolved);
        }
    }
    Some(value)
}

/// Apply instance overrides in order. Unknown ids and read-only targets
/// are skipped with a warning; a bad value leaves the property untouched.
pub fn apply_overrides(catalog: &mut PropertyCatalog, overrides: &[PropertyOverride]) {
    for ov in overrides {
        let Some(prop) = catalog.get(&ov.id) else {
            warn!("override names unknown property {}", ov.id);
            continue;
        };
        if prop.is_read_only() {
            warn!("override for read-only property {} ignored", ov.id);
            continue;
        }
        let ty = prop.scalar_type;

        let new_value = match &ov.value {
            OverrideValue::Simple(literal) => {
                resolve_literal(catalog, &ov.id, ty, literal).map(PropertyValue::Simple)
            }
            OverrideValue::Sequence(literals) => {
                let mut items = Vec::with_capacity(literals.len());
                let mut ok = true;
                for literal in literals {
                    match resolve_literal(catalog, &ov.id, ty, literal) {
                        Some(v) => items.push(v),
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                ok.then_some(PropertyValue::Sequence(items))
            }
            OverrideValue::Struct(fields) => {
                let existing = prop.value.as_ref().and_then(PropertyValue::as_struct);
                merge_struct_override(catalog, &ov.id, existing, fields)
                    .map(PropertyValue::Struct)
            }
        };

        if let Some(value) = new_value {
            if let Some(prop) = catalog.get_mut(&ov.id) {
                prop.value = Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AccessMode, Property};

    fn catalog() -> PropertyCatalog {
        let mut c = PropertyCatalog::new();
        c.insert(Property::simple("sample_rate", SimpleValue::Long(3)))
            .unwrap();
        c.insert(Property::simple("bandwidth", SimpleValue::Double(1.0)))
            .unwrap();
        c
    }

    fn simple(id: &str, literal: &str) -> PropertyOverride {
        PropertyOverride {
            id: id.to_string(),
            value: OverrideValue::Simple(literal.to_string()),
        }
    }

    #[test]
    fn test_simple_override_parses_declared_type() {
        let mut c = catalog();
        apply_overrides(&mut c, &[simple("sample_rate", "40")]);
        assert_eq!(
            c.get("sample_rate").unwrap().simple_value(),
            Some(&SimpleValue::Long(40))
        );
    }

    #[test]
    fn test_formula_override_sees_earlier_overrides() {
        let mut c = catalog();
        apply_overrides(
            &mut c,
            &[
                simple("sample_rate", "10"),
                simple("bandwidth", "__MATH__(2,sample_rate,*)"),
            ],
        );
        assert_eq!(
            c.get("bandwidth").unwrap().simple_value(),
            Some(&SimpleValue::Double(20.0))
        );
    }

    #[test]
    fn test_read_only_target_skipped() {
        let mut c = PropertyCatalog::new();
        let mut p = Property::simple("fixed", SimpleValue::Long(1));
        p.mode = AccessMode::ReadOnly;
        c.insert(p).unwrap();
        apply_overrides(&mut c, &[simple("fixed", "2")]);
        assert_eq!(c.get("fixed").unwrap().simple_value(), Some(&SimpleValue::Long(1)));
    }

    #[test]
    fn test_bad_value_leaves_property_untouched() {
        let mut c = catalog();
        apply_overrides(&mut c, &[simple("sample_rate", "not-a-number")]);
        assert_eq!(
            c.get("sample_rate").unwrap().simple_value(),
            Some(&SimpleValue::Long(3))
        );
    }

    #[test]
    fn test_unknown_id_skipped() {
        let mut c = catalog();
        apply_overrides(&mut c, &[simple("absent", "1")]);
        assert!(c.get("absent").is_none());
    }
}
