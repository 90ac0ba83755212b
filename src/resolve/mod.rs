/*!
 * Implementation Resolution
 * Picks the first implementation of a package that can be placed on the
 * host, resolving soft-package dependencies recursively
 */

use crate::descriptor::{Implementation, PackageDescriptor, PropertyCatalog, SoftPackageRef};
use crate::matching::{check_processor_and_os, is_allocation_satisfied};
use log::{debug, info};

/// Try to satisfy one soft-package reference, honoring an `implref` pin.
/// On success the chosen implementation index is recorded on the
/// referenced package.
fn resolve_softpkg_ref(dep: &mut SoftPackageRef, host: &PropertyCatalog) -> bool {
    let pinned = dep.implref.clone();
    let candidates: Vec<usize> = dep
        .package
        .implementations
        .iter()
        .enumerate()
        .filter(|(_, imp)| pinned.as_deref().map_or(true, |p| imp.id == p))
        .map(|(i, _)| i)
        .collect();

    for index in candidates {
        if implementation_deployable(&mut dep.package, index, host) {
            dep.package.select(index);
            debug!(
                "soft package {} resolved to implementation {}",
                dep.package.name, dep.package.implementations[index].id
            );
            return true;
        }
    }
    dep.package.clear_selection();
    false
}

fn implementation_deployable(
    pkg: &mut PackageDescriptor,
    index: usize,
    host: &PropertyCatalog,
) -> bool {
    // Placement gates are checked on an immutable view before the
    // recursive descent needs mutable access.
    {
        let imp = &pkg.implementations[index];
        if !check_processor_and_os(imp, host) {
            return false;
        }
        if !is_allocation_satisfied(host, &imp.dependencies) {
            return false;
        }
    }
    resolve_implementation_deps(&mut pkg.implementations[index], host)
}

/// Resolve every soft-package dependency of an implementation. All-or-
/// nothing: if any reference cannot be satisfied, every selection made in
/// this subtree is cleared before returning.
pub fn resolve_implementation_deps(imp: &mut Implementation, host: &PropertyCatalog) -> bool {
    for i in 0..imp.softpkg_deps.len() {
        if !resolve_softpkg_ref(&mut imp.softpkg_deps[i], host) {
            debug!(
                "implementation {} rejected: soft package {} has no deployable implementation",
                imp.id, imp.softpkg_deps[i].package.name
            );
            imp.clear_selections();
            return false;
        }
    }
    true
}

/// Select the first deployable implementation of a package, in
/// declaration order. Returns the selected index, which is also recorded
/// on the package. On failure no selection remains anywhere in the tree.
pub fn select_implementation(
    pkg: &mut PackageDescriptor,
    host: &PropertyCatalog,
) -> Option<usize> {
    for index in 0..pkg.implementations.len() {
        if implementation_deployable(pkg, index, host) {
            pkg.select(index);
            info!(
                "package {} using implementation {}",
                pkg.name, pkg.implementations[index].id
            );
            return Some(index);
        }
    }
    pkg.clear_selection();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        AccessMode, CodeArtifact, CodeKind, ComparisonAction, ComponentKind, Property,
        PropertyKinds, PropertyValue, SimpleValue,
    };

    fn host(processor: &str) -> PropertyCatalog {
        let mut catalog = PropertyCatalog::new();
        catalog
            .insert(Property {
                id: "DCE:proc".to_string(),
                name: Some("processor_name".to_string()),
                mode: AccessMode::ReadOnly,
                action: ComparisonAction::Eq,
                kinds: PropertyKinds::ALLOCATION,
                scalar_type: crate::descriptor::ScalarType::String,
                value: Some(PropertyValue::Simple(SimpleValue::String(
                    processor.to_string(),
                ))),
            })
            .unwrap();
        catalog
    }

    fn implementation(id: &str, processors: &[&str]) -> Implementation {
        Implementation {
            id: id.to_string(),
            code: CodeArtifact {
                local_file: format!("{id}.so"),
                kind: CodeKind::SharedLibrary,
                entry_point: None,
                stack_size: None,
                priority: None,
            },
            prf_file: None,
            processors: processors.iter().map(|s| s.to_string()).collect(),
            os: vec![],
            dependencies: vec![],
            softpkg_deps: vec![],
        }
    }

    fn package(name: &str, imps: Vec<Implementation>) -> PackageDescriptor {
        PackageDescriptor {
            id: format!("DCE:{name}"),
            name: name.to_string(),
            spd_path: format!("/{name}.spd.json"),
            prf_file: None,
            kind: ComponentKind::Device,
            implementations: imps,
            uses_devices: vec![],
            selected: None,
        }
    }

    #[test]
    fn test_first_match_wins_in_declaration_order() {
        let mut pkg = package(
            "dev",
            vec![
                implementation("sparc_build", &["sparc"]),
                implementation("x86_build", &["x86_64"]),
                implementation("generic_build", &[]),
            ],
        );
        // generic_build would also match; the earlier x86 build wins
        assert_eq!(select_implementation(&mut pkg, &host("x86_64")), Some(1));
        assert_eq!(pkg.selected_implementation().unwrap().id, "x86_build");
    }

    #[test]
    fn test_deterministic_across_repeated_runs() {
        let host = host("x86_64");
        for _ in 0..3 {
            let mut pkg = package(
                "dev",
                vec![
                    implementation("a", &[]),
                    implementation("b", &[]),
                ],
            );
            assert_eq!(select_implementation(&mut pkg, &host), Some(0));
        }
    }

    #[test]
    fn test_no_candidate_matches() {
        let mut pkg = package("dev", vec![implementation("sparc_build", &["sparc"])]);
        assert_eq!(select_implementation(&mut pkg, &host("x86_64")), None);
        assert!(pkg.selections_clear());
    }

    #[test]
    fn test_softpkg_dependency_resolved_recursively() {
        let mut inner = package("fft", vec![implementation("fft_x86", &["x86_64"])]);
        inner.implementations.insert(0, implementation("fft_sparc", &["sparc"]));

        let mut outer_imp = implementation("dev_x86", &["x86_64"]);
        outer_imp.softpkg_deps.push(SoftPackageRef {
            local_file: "/fft.spd.json".to_string(),
            implref: None,
            package: inner,
        });
        let mut pkg = package("dev", vec![outer_imp]);

        assert_eq!(select_implementation(&mut pkg, &host("x86_64")), Some(0));
        let dep = &pkg.implementations[0].softpkg_deps[0];
        assert_eq!(dep.package.selected_implementation().unwrap().id, "fft_x86");
    }

    #[test]
    fn test_failed_resolution_leaves_no_partial_selection() {
        // inner package only builds for sparc, outer for x86: outer's only
        // implementation must be rejected and nothing may stay selected
        let inner = package("fft", vec![implementation("fft_sparc", &["sparc"])]);
        let mut outer_imp = implementation("dev_x86", &["x86_64"]);
        outer_imp.softpkg_deps.push(SoftPackageRef {
            local_file: "/fft.spd.json".to_string(),
            implref: None,
            package: inner,
        });
        let mut pkg = package("dev", vec![outer_imp]);

        assert_eq!(select_implementation(&mut pkg, &host("x86_64")), None);
        assert!(pkg.selections_clear());
    }

    #[test]
    fn test_implref_pins_candidate() {
        let inner = package(
            "fft",
            vec![
                implementation("fft_generic", &[]),
                implementation("fft_tuned", &[]),
            ],
        );
        let mut outer_imp = implementation("dev", &[]);
        outer_imp.softpkg_deps.push(SoftPackageRef {
            local_file: "/fft.spd.json".to_string(),
            implref: Some("fft_tuned".to_string()),
            package: inner,
        });
        let mut pkg = package("dev", vec![outer_imp]);

        assert_eq!(select_implementation(&mut pkg, &host("x86_64")), Some(0));
        let dep = &pkg.implementations[0].softpkg_deps[0];
        assert_eq!(dep.package.selected_implementation().unwrap().id, "fft_tuned");
    }
}
