/*!
 * Artifact Classification
 * Decides which search paths a loaded dependency contributes to
 */

use log::debug;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const PYTHONPATH: &str = "PYTHONPATH";
pub const CLASSPATH: &str = "CLASSPATH";
pub const OCTAVE_PATH: &str = "OCTAVE_PATH";

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// What kind of loadable artifact a path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    NativeBinary,
    PythonModule,
    JavaArchive,
    /// Unrecognized; contributed to every search path so a consumer of
    /// any runtime can still find it.
    Unknown,
}

fn magic_of(path: &Path) -> Option<[u8; 4]> {
    let mut file = File::open(path).ok()?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).ok()?;
    Some(magic)
}

/// Classify by content first, falling back to the file name. A path that
/// cannot be probed classifies as [`ArtifactClass::Unknown`]; probing
/// failures are never fatal here.
pub fn classify(path: &Path) -> ArtifactClass {
    if path.is_dir() {
        if path.join("__init__.py").exists() {
            return ArtifactClass::PythonModule;
        }
        return ArtifactClass::Unknown;
    }

    match magic_of(path) {
        Some(ELF_MAGIC) => return ArtifactClass::NativeBinary,
        Some(ZIP_MAGIC) => return ArtifactClass::JavaArchive,
        Some(_) => {}
        None => debug!("cannot probe {}, classifying by name", path.display()),
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("py") | Some("pyc") => ArtifactClass::PythonModule,
        Some("jar") => ArtifactClass::JavaArchive,
        Some("so") => ArtifactClass::NativeBinary,
        _ => ArtifactClass::Unknown,
    }
}

/// Accumulated search-path contributions, newest first per variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPathMods {
    entries: BTreeMap<&'static str, Vec<String>>,
}

impl SearchPathMods {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, var: &'static str, dir: String) {
        let dirs = self.entries.entry(var).or_default();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    /// Record the contribution of one classified artifact.
    pub fn add(&mut self, class: ArtifactClass, path: &Path) {
        let dir = containing_dir(path);
        match class {
            ArtifactClass::NativeBinary => self.push(LD_LIBRARY_PATH, dir),
            ArtifactClass::PythonModule => self.push(PYTHONPATH, dir),
            // the archive itself goes on the class path
            ArtifactClass::JavaArchive => self.push(CLASSPATH, path.display().to_string()),
            ArtifactClass::Unknown => {
                self.push(LD_LIBRARY_PATH, dir.clone());
                self.push(PYTHONPATH, dir.clone());
                self.push(CLASSPATH, dir.clone());
                self.push(OCTAVE_PATH, dir);
            }
        }
    }

    pub fn merge(&mut self, other: &SearchPathMods) {
        for (var, dirs) in &other.entries {
            for dir in dirs {
                self.push(var, dir.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.entries.iter().map(|(var, dirs)| (*var, dirs.as_slice()))
    }
}

fn containing_dir(path: &Path) -> String {
    if path.is_dir() {
        return path.display().to_string();
    }
    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .display()
        .to_string()
}
