/*!
 * Descriptor Store
 * Loads descriptor documents from a profile store into the typed model
 */

use crate::descriptor::node_config::NodeConfiguration;
use crate::descriptor::package::{
    CodeArtifact, ComponentKind, DependencyRef, Implementation, OsConstraint, PackageDescriptor,
    SoftPackageRef, UsesDeviceRequirement,
};
use crate::descriptor::property::{Property, PropertyCatalog};
use log::trace;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Descriptor loading and validation failures.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate property id {id} in {path}")]
    DuplicateProperty { path: String, id: String },

    #[error("soft package reference cycle through {path}")]
    Cycle { path: String },
}

/// Read access to profile documents and deployable artifacts.
pub trait FileStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Filesystem location of a store path, for launching and loading.
    fn local_path(&self, path: &str) -> PathBuf;
}

/// Loads typed descriptors by store path.
pub trait DescriptorStore: Send + Sync {
    fn load_package(&self, path: &str) -> Result<PackageDescriptor, ParseError>;

    fn load_property_catalog(&self, path: &str) -> Result<PropertyCatalog, ParseError>;

    fn load_node_config(&self, path: &str) -> Result<NodeConfiguration, ParseError>;
}

/// A file store rooted at a directory. Store paths are absolute within
/// the store (`/dev/nodes/...`) and resolved under the root.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileStore for LocalFileStore {
    fn exists(&self, path: &str) -> bool {
        self.local_path(path).exists()
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.local_path(path))
    }

    fn local_path(&self, path: &str) -> PathBuf {
        path_clean::clean(self.root.join(path.trim_start_matches('/')))
    }
}

// Document forms. Packages reference soft-package dependencies by file,
// so they load through an intermediate shape and get stitched into the
// owned tree here.

#[derive(Deserialize)]
struct RawSoftPackageRef {
    local_file: String,
    #[serde(default)]
    implref: Option<String>,
}

#[derive(Deserialize)]
struct RawImplementation {
    id: String,
    code: CodeArtifact,
    #[serde(default)]
    prf_file: Option<String>,
    #[serde(default)]
    processors: Vec<String>,
    #[serde(default)]
    os: Vec<OsConstraint>,
    #[serde(default)]
    dependencies: Vec<DependencyRef>,
    #[serde(default)]
    softpkg_deps: Vec<RawSoftPackageRef>,
}

#[derive(Deserialize)]
struct RawPackage {
    id: String,
    name: String,
    #[serde(default)]
    prf_file: Option<String>,
    #[serde(default)]
    kind: ComponentKind,
    implementations: Vec<RawImplementation>,
    #[serde(default)]
    uses_devices: Vec<UsesDeviceRequirement>,
}

/// JSON-backed descriptor store over a [`FileStore`].
pub struct JsonDescriptorStore<F> {
    files: F,
}

impl<F: FileStore> JsonDescriptorStore<F> {
    pub fn new(files: F) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    fn read_document<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ParseError> {
        let bytes = self.files.read(path).map_err(|source| ParseError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ParseError::Malformed {
            path: path.to_string(),
            source,
        })
    }

    fn load_package_inner(
        &self,
        path: &str,
        visiting: &mut Vec<String>,
    ) -> Result<PackageDescriptor, ParseError> {
        if visiting.iter().any(|p| p == path) {
            return Err(ParseError::Cycle {
                path: path.to_string(),
            });
        }
        visiting.push(path.to_string());
        trace!("loading package descriptor {}", path);

        let raw: RawPackage = self.read_document(path)?;
        let base = Path::new(path).parent().unwrap_or_else(|| Path::new("/"));

        let mut implementations = Vec::with_capacity(raw.implementations.len());
        for raw_imp in raw.implementations {
            let mut softpkg_deps = Vec::with_capacity(raw_imp.softpkg_deps.len());
            for raw_dep in raw_imp.softpkg_deps {
                let dep_path = store_relative(base, &raw_dep.local_file);
                let package = self.load_package_inner(&dep_path, visiting)?;
                softpkg_deps.push(SoftPackageRef {
                    local_file: raw_dep.local_file,
                    implref: raw_dep.implref,
                    package,
                });
            }
            implementations.push(Implementation {
                id: raw_imp.id,
                code: raw_imp.code,
                prf_file: raw_imp.prf_file,
                processors: raw_imp.processors,
                os: raw_imp.os,
                dependencies: raw_imp.dependencies,
                softpkg_deps,
            });
        }

        visiting.pop();
        Ok(PackageDescriptor {
            id: raw.id,
            name: raw.name,
            spd_path: path.to_string(),
            prf_file: raw.prf_file,
            kind: raw.kind,
            implementations,
            uses_devices: raw.uses_devices,
            selected: Default::default(),
        })
    }
}

fn store_relative(base: &Path, reference: &str) -> String {
    if reference.starts_with('/') {
        return reference.to_string();
    }
    path_clean::clean(base.join(reference))
        .to_string_lossy()
        .into_owned()
}

impl<F: FileStore> DescriptorStore for JsonDescriptorStore<F> {
    fn load_package(&self, path: &str) -> Result<PackageDescriptor, ParseError> {
        let mut visiting = Vec::new();
        self.load_package_inner(path, &mut visiting)
    }

    fn load_property_catalog(&self, path: &str) -> Result<PropertyCatalog, ParseError> {
        let props: Vec<Property> = self.read_document(path)?;
        let mut catalog = PropertyCatalog::new();
        for prop in props {
            catalog.insert(prop).map_err(|id| ParseError::DuplicateProperty {
                path: path.to_string(),
                id,
            })?;
        }
        Ok(catalog)
    }

    fn load_node_config(&self, path: &str) -> Result<NodeConfiguration, ParseError> {
        self.read_document(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    fn store(root: &Path) -> JsonDescriptorStore<LocalFileStore> {
        JsonDescriptorStore::new(LocalFileStore::new(root))
    }

    #[test]
    fn test_load_package_with_nested_softpkg() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "/deps/fft/fft.spd.json",
            r#"{
                "id": "DCE:fft",
                "name": "fft",
                "implementations": [{
                    "id": "cpp",
                    "code": { "local_file": "libfft.so", "kind": "shared_library" }
                }]
            }"#,
        );
        write(
            dir.path(),
            "/devices/rx/rx.spd.json",
            r#"{
                "id": "DCE:rx",
                "name": "rx",
                "implementations": [{
                    "id": "cpp",
                    "code": { "local_file": "rx", "kind": "executable" },
                    "softpkg_deps": [{ "local_file": "/deps/fft/fft.spd.json" }]
                }]
            }"#,
        );

        let pkg = store(dir.path()).load_package("/devices/rx/rx.spd.json").unwrap();
        assert_eq!(pkg.name, "rx");
        let dep = &pkg.implementations[0].softpkg_deps[0];
        assert_eq!(dep.package.name, "fft");
        assert_eq!(dep.package.spd_path, "/deps/fft/fft.spd.json");
    }

    #[test]
    fn test_softpkg_cycle_detected() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "/a/a.spd.json",
            r#"{
                "id": "a", "name": "a",
                "implementations": [{
                    "id": "i",
                    "code": { "local_file": "a.so", "kind": "shared_library" },
                    "softpkg_deps": [{ "local_file": "/b/b.spd.json" }]
                }]
            }"#,
        );
        write(
            dir.path(),
            "/b/b.spd.json",
            r#"{
                "id": "b", "name": "b",
                "implementations": [{
                    "id": "i",
                    "code": { "local_file": "b.so", "kind": "shared_library" },
                    "softpkg_deps": [{ "local_file": "/a/a.spd.json" }]
                }]
            }"#,
        );

        let err = store(dir.path()).load_package("/a/a.spd.json").unwrap_err();
        assert!(matches!(err, ParseError::Cycle { .. }));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "/devices/rx/rx.prf.json",
            r#"[
                { "id": "p", "scalar_type": "long", "value": { "shape": "simple", "data": { "type": "long", "value": 1 } } },
                { "id": "p", "scalar_type": "long" }
            ]"#,
        );

        let err = store(dir.path())
            .load_property_catalog("/devices/rx/rx.prf.json")
            .unwrap_err();
        assert!(matches!(err, ParseError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_missing_document_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = store(dir.path()).load_package("/nope.spd.json").unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
