/*!
 * Software Packages
 * Package descriptors: code artifacts, implementations, and their dependencies
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What kind of binary an implementation ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    Executable,
    SharedLibrary,
    KernelModule,
    Driver,
}

/// Whether a package describes a device or a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    #[default]
    Device,
    Service,
}

/// The deployable artifact of one implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub local_file: String,
    pub kind: CodeKind,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub stack_size: Option<u64>,
    #[serde(default)]
    pub priority: Option<u64>,
}

impl CodeArtifact {
    /// The file actually launched: the entry point when one is declared,
    /// otherwise the code file itself.
    pub fn launch_file(&self) -> &str {
        self.entry_point.as_deref().unwrap_or(&self.local_file)
    }
}

/// An operating-system constraint declared by an implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsConstraint {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Dependency payload: a plain literal or named struct fields, each of
/// which may itself be a capacity formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyValue {
    Simple(String),
    Struct(Vec<(String, String)>),
}

/// One property dependency an implementation declares against its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub property_id: String,
    pub value: DependencyValue,
}

/// A `usesdevice` requirement: capacities a unit needs from some other
/// device in the domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsesDeviceRequirement {
    pub id: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

/// A reference to another software package this implementation loads
/// before launch. The referenced package is resolved at descriptor load
/// time so the tree is fully owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftPackageRef {
    pub local_file: String,
    /// Pin to one implementation of the referenced package, if set.
    #[serde(default)]
    pub implref: Option<String>,
    pub package: PackageDescriptor,
}

/// One way of realizing a package on a concrete host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub id: String,
    pub code: CodeArtifact,
    /// Implementation-specific property catalog file, if any.
    #[serde(default)]
    pub prf_file: Option<String>,
    #[serde(default)]
    pub processors: Vec<String>,
    #[serde(default)]
    pub os: Vec<OsConstraint>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub softpkg_deps: Vec<SoftPackageRef>,
}

impl Implementation {
    pub fn is_shared_library(&self) -> bool {
        self.code.kind == CodeKind::SharedLibrary
    }

    /// Drop every selection recorded in this implementation's soft-package
    /// subtree.
    pub fn clear_selections(&mut self) {
        for dep in &mut self.softpkg_deps {
            dep.package.clear_selection();
        }
    }
}

/// A loaded software package with its candidate implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub id: String,
    pub name: String,
    /// Store path of the descriptor document, for resolving relative
    /// artifact paths.
    pub spd_path: String,
    #[serde(default)]
    pub prf_file: Option<String>,
    #[serde(default)]
    pub kind: ComponentKind,
    pub implementations: Vec<Implementation>,
    #[serde(default)]
    pub uses_devices: Vec<UsesDeviceRequirement>,
    #[serde(skip)]
    pub(crate) selected: Option<usize>,
}

impl PackageDescriptor {
    /// Record the chosen implementation, clearing any state left behind by
    /// previously tried candidates.
    pub fn select(&mut self, index: usize) {
        for (i, imp) in self.implementations.iter_mut().enumerate() {
            if i != index {
                imp.clear_selections();
            }
        }
        self.selected = Some(index);
    }

    /// Clear this package's selection and every nested one.
    pub fn clear_selection(&mut self) {
        self.selected = None;
        for imp in &mut self.implementations {
            imp.clear_selections();
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_implementation(&self) -> Option<&Implementation> {
        self.selected.map(|i| &self.implementations[i])
    }

    /// True if no selection exists anywhere in this package's tree.
    pub fn selections_clear(&self) -> bool {
        self.selected.is_none()
            && self.implementations.iter().all(|imp| {
                imp.softpkg_deps
                    .iter()
                    .all(|dep| dep.package.selections_clear())
            })
    }

    /// Resolve a path from the package document against the document's
    /// own directory.
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        let base = Path::new(&self.spd_path)
            .parent()
            .unwrap_or_else(|| Path::new(""));
        path_clean::clean(base.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> PackageDescriptor {
        PackageDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            spd_path: format!("/deps/{id}/{id}.spd.json"),
            prf_file: None,
            kind: ComponentKind::Device,
            implementations: vec![Implementation {
                id: "impl_1".to_string(),
                code: CodeArtifact {
                    local_file: "lib.so".to_string(),
                    kind: CodeKind::SharedLibrary,
                    entry_point: None,
                    stack_size: None,
                    priority: None,
                },
                prf_file: None,
                processors: vec![],
                os: vec![],
                dependencies: vec![],
                softpkg_deps: vec![],
            }],
            uses_devices: vec![],
            selected: None,
        }
    }

    #[test]
    fn test_select_clears_other_candidates() {
        let mut pkg = leaf("outer");
        let mut second = pkg.implementations[0].clone();
        second.id = "impl_2".to_string();
        let mut nested = leaf("inner");
        nested.select(0);
        second.softpkg_deps.push(SoftPackageRef {
            local_file: "inner.spd.json".to_string(),
            implref: None,
            package: nested,
        });
        pkg.implementations.push(second);

        pkg.select(0);
        assert_eq!(pkg.selected_index(), Some(0));
        assert!(pkg.implementations[1].softpkg_deps[0]
            .package
            .selections_clear());
    }

    #[test]
    fn test_clear_selection_recurses() {
        let mut inner = leaf("inner");
        inner.select(0);
        let mut pkg = leaf("outer");
        pkg.implementations[0].softpkg_deps.push(SoftPackageRef {
            local_file: "inner.spd.json".to_string(),
            implref: None,
            package: inner,
        });
        pkg.select(0);

        pkg.clear_selection();
        assert!(pkg.selections_clear());
    }

    #[test]
    fn test_resolve_path_relative_to_document() {
        let pkg = leaf("dev");
        assert_eq!(
            pkg.resolve_path("cpp/dev"),
            PathBuf::from("/deps/dev/cpp/dev")
        );
    }

    #[test]
    fn test_launch_file_prefers_entry_point() {
        let mut pkg = leaf("dev");
        assert_eq!(pkg.implementations[0].code.launch_file(), "lib.so");
        pkg.implementations[0].code.entry_point = Some("bin/start".to_string());
        assert_eq!(pkg.implementations[0].code.launch_file(), "bin/start");
    }
}
