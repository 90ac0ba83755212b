/*!
 * Unit Launcher
 * Spawns standalone units as OS processes and places composite-hosted
 * personas into their registered parent
 */

use crate::core::types::{
    NodeIdentity, Pid, PARENT_RESOLVE_POLL, PARENT_RESOLVE_TIMEOUT, UNMANAGED_PID,
};
use crate::descriptor::{CodeKind, ComponentKind, FileStore, Implementation, PropertyKinds};
use crate::ledger::{RegistrationLedger, UnitKind};
use crate::plan::{DeploymentRecord, LaunchStrategy};
use crate::supervise::artifacts::{classify, SearchPathMods};
use crate::supervise::environment::compose_child_env;
use crate::supervise::ProcessLaunchError;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Argument keys with fixed positions in the child argv.
const PROFILE_NAME: &str = "PROFILE_NAME";
const DEVICE_ID: &str = "DEVICE_ID";
const DEVICE_LABEL: &str = "DEVICE_LABEL";
const SERVICE_NAME: &str = "SERVICE_NAME";
const COMPOSITE_DEVICE_IOR: &str = "COMPOSITE_DEVICE_IOR";
const IDM_CHANNEL_IOR: &str = "IDM_CHANNEL_IOR";
const LOGGING_CONFIG_URI: &str = "LOGGING_CONFIG_URI";
const DEBUG_LEVEL: &str = "DEBUG_LEVEL";
const DOM_PATH: &str = "DOM_PATH";
const DEVICE_MGR_IOR: &str = "DEVICE_MGR_IOR";

/// Merged-property ids honored for the child working directory.
const CACHE_DIRECTORY: &str = "cacheDirectory";
const WORKING_DIRECTORY: &str = "workingDirectory";

/// A reaped child exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitEvent {
    pub pid: Pid,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Node-level launch inputs shared by every unit.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub node: NodeIdentity,
    /// Reference the child uses to reach back to this node; always the
    /// final argument pair.
    pub node_ref: String,
    pub event_channel: Option<String>,
    pub cache_root: PathBuf,
    pub default_log_uri: Option<String>,
    pub debug_level: Option<u8>,
}

struct LoadedDependency {
    store_path: String,
    kind: CodeKind,
}

/// Owns every child process the node launches.
pub struct ProcessSupervisor {
    files: Arc<dyn FileStore>,
    ledger: Arc<RegistrationLedger>,
    children: DashMap<Pid, Child>,
    exit_tx: flume::Sender<ExitEvent>,
    exit_rx: flume::Receiver<ExitEvent>,
}

impl ProcessSupervisor {
    pub fn new(files: Arc<dyn FileStore>, ledger: Arc<RegistrationLedger>) -> Self {
        let (exit_tx, exit_rx) = flume::unbounded();
        Self {
            files,
            ledger,
            children: DashMap::new(),
            exit_tx,
            exit_rx,
        }
    }

    /// Receiver for reaped child exits.
    pub fn exit_events(&self) -> flume::Receiver<ExitEvent> {
        self.exit_rx.clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.children.contains_key(&pid)
    }

    /// Launch one planned unit according to its strategy.
    pub fn launch(&self, rec: &DeploymentRecord, ctx: &LaunchContext) -> Result<(), ProcessLaunchError> {
        match rec.strategy {
            LaunchStrategy::Standalone => self.launch_standalone(rec, ctx),
            LaunchStrategy::CompositeHosted => self.launch_persona(rec, ctx),
        }
    }

    fn implementation_of<'r>(
        &self,
        rec: &'r DeploymentRecord,
    ) -> Result<&'r Implementation, ProcessLaunchError> {
        rec.implementation()
            .ok_or_else(|| ProcessLaunchError::NoImplementation {
                package: rec.package.name.clone(),
            })
    }

    /// Depth-first walk of the resolved soft-package tree: dependencies
    /// of a package load before the package itself.
    fn collect_dependencies(
        &self,
        imp: &Implementation,
        mods: &mut SearchPathMods,
        loaded: &mut Vec<LoadedDependency>,
    ) -> Result<(), ProcessLaunchError> {
        for dep in &imp.softpkg_deps {
            let selected = dep.package.selected_implementation().ok_or_else(|| {
                ProcessLaunchError::NoImplementation {
                    package: dep.package.name.clone(),
                }
            })?;
            self.collect_dependencies(selected, mods, loaded)?;

            let store_path = dep
                .package
                .resolve_path(&selected.code.local_file)
                .to_string_lossy()
                .into_owned();
            if !self.files.exists(&store_path) {
                return Err(ProcessLaunchError::MissingArtifact { path: store_path });
            }
            let local = self.files.local_path(&store_path);
            mods.add(classify(&local), &local);
            if !loaded.iter().any(|l| l.store_path == store_path) {
                loaded.push(LoadedDependency {
                    store_path,
                    kind: selected.code.kind,
                });
            }
        }
        Ok(())
    }

    fn working_directory(
        &self,
        rec: &DeploymentRecord,
        ctx: &LaunchContext,
    ) -> Result<PathBuf, ProcessLaunchError> {
        let overridden = [WORKING_DIRECTORY, CACHE_DIRECTORY]
            .iter()
            .find_map(|id| rec.merged.get(id).and_then(|p| p.simple_value()))
            .map(|v| PathBuf::from(v.render()));
        let dir = overridden.unwrap_or_else(|| {
            ctx.cache_root
                .join(format!(".{}", ctx.node.label))
                .join(rec.label())
        });
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn launch_standalone(
        &self,
        rec: &DeploymentRecord,
        ctx: &LaunchContext,
    ) -> Result<(), ProcessLaunchError> {
        let imp = self.implementation_of(rec)?;

        let mut mods = SearchPathMods::new();
        let mut loaded = Vec::new();
        self.collect_dependencies(imp, &mut mods, &mut loaded)?;

        let code_path = rec
            .package
            .resolve_path(imp.code.launch_file())
            .to_string_lossy()
            .into_owned();
        if !self.files.exists(&code_path) {
            return Err(ProcessLaunchError::MissingArtifact { path: code_path });
        }
        let executable = self.files.local_path(&code_path);

        let cwd = self.working_directory(rec, ctx)?;
        let env = compose_child_env(std::env::vars(), &mods);
        let args = build_arguments(rec, ctx);

        if let Some(affinity) = &rec.instantiation.affinity {
            debug!("affinity request {:?} for {} noted", affinity, rec.label());
        }

        let mut command = spawn_command(&executable);
        for (key, value) in &args {
            command.arg(key).arg(value);
        }
        command
            .env_clear()
            .envs(env)
            .current_dir(&cwd)
            .stdin(Stdio::null());

        let child = command.spawn().map_err(|source| ProcessLaunchError::Spawn {
            path: executable.display().to_string(),
            source,
        })?;
        let pid = child.id();
        self.children.insert(pid, child);

        let (kind, identifier) = registration_identity(rec);
        self.ledger.insert_pending(kind, &identifier, rec.label(), pid);
        info!(
            "launched {} from {} (pid {})",
            rec.label(),
            code_path,
            pid
        );
        Ok(())
    }

    fn launch_persona(
        &self,
        rec: &DeploymentRecord,
        ctx: &LaunchContext,
    ) -> Result<(), ProcessLaunchError> {
        let imp = self.implementation_of(rec)?;
        let parent = rec
            .composite_parent
            .clone()
            .ok_or_else(|| ProcessLaunchError::ParentUnresolved {
                parent: rec.label().to_string(),
            })?;

        // The parent registers on its own schedule; poll with a hard
        // deadline rather than forever.
        let deadline = Instant::now() + PARENT_RESOLVE_TIMEOUT;
        let host = loop {
            if let Some(handle) = self.ledger.device_handle(&parent) {
                break handle;
            }
            if Instant::now() >= deadline {
                return Err(ProcessLaunchError::ParentUnresolved { parent });
            }
            thread::sleep(PARENT_RESOLVE_POLL);
        };

        let mut mods = SearchPathMods::new();
        let mut loaded = Vec::new();
        self.collect_dependencies(imp, &mut mods, &mut loaded)?;
        for dep in &loaded {
            host.load(&dep.store_path, dep.kind)?;
        }

        let code_path = rec
            .package
            .resolve_path(&imp.code.local_file)
            .to_string_lossy()
            .into_owned();
        if !self.files.exists(&code_path) {
            return Err(ProcessLaunchError::MissingArtifact { path: code_path });
        }
        host.load(&code_path, imp.code.kind)?;

        let entry = rec
            .package
            .resolve_path(imp.code.launch_file())
            .to_string_lossy()
            .into_owned();
        let dep_paths: Vec<String> = loaded.into_iter().map(|l| l.store_path).collect();
        host.execute_linked(&entry, &build_arguments(rec, ctx), &dep_paths)?;

        let (kind, identifier) = registration_identity(rec);
        self.ledger
            .insert_pending(kind, &identifier, rec.label(), UNMANAGED_PID);
        info!("placed {} into composite host {}", rec.label(), parent);
        Ok(())
    }

    /// One non-blocking reap pass over the child table.
    pub fn reap(&self) {
        let pids: Vec<Pid> = self.children.iter().map(|entry| *entry.key()).collect();
        for pid in pids {
            let status = match self.children.get_mut(&pid) {
                Some(mut child) => match child.try_wait() {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("wait on pid {} failed: {}", pid, e);
                        None
                    }
                },
                None => None,
            };
            if let Some(status) = status {
                self.children.remove(&pid);
                let event = ExitEvent {
                    pid,
                    code: status.code(),
                    signal: exit_signal(&status),
                };
                let _ = self.exit_tx.send(event);
            }
        }
    }

    /// Background reaper. Runs until shutdown is requested and every
    /// child has been collected.
    pub fn start_reaper(
        self: &Arc<Self>,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let supervisor = Arc::clone(self);
        thread::Builder::new()
            .name("child-reaper".to_string())
            .spawn(move || loop {
                supervisor.reap();
                if shutdown.load(Ordering::SeqCst) && supervisor.children.is_empty() {
                    break;
                }
                thread::sleep(Duration::from_millis(100));
            })
    }
}

fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

fn registration_identity(rec: &DeploymentRecord) -> (UnitKind, String) {
    let kind = match rec.kind() {
        ComponentKind::Device => UnitKind::Device,
        ComponentKind::Service => UnitKind::Service,
    };
    (kind, rec.registration_identity().to_string())
}

/// Scripted artifacts launch through their interpreter; anything else is
/// executed directly.
fn spawn_command(executable: &Path) -> Command {
    match executable.extension().and_then(|e| e.to_str()) {
        Some("py") => {
            let mut cmd = Command::new("python3");
            cmd.arg(executable);
            cmd
        }
        Some("sh") => {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg(executable);
            cmd
        }
        _ => Command::new(executable),
    }
}

/// Map a symbolic or numeric level to the single-digit child convention.
fn level_digit(level: &str) -> Option<char> {
    match level.trim().to_ascii_uppercase().as_str() {
        "0" | "FATAL" => Some('0'),
        "1" | "ERROR" => Some('1'),
        "2" | "WARN" | "WARNING" => Some('2'),
        "3" | "INFO" => Some('3'),
        "4" | "DEBUG" => Some('4'),
        "5" | "TRACE" | "ALL" => Some('5'),
        _ => None,
    }
}

fn resolve_logging(rec: &DeploymentRecord, ctx: &LaunchContext) -> (Option<String>, Option<char>) {
    let directive = rec.instantiation.logging.as_ref();
    let uri = rec
        .merged
        .get(LOGGING_CONFIG_URI)
        .and_then(|p| p.simple_value())
        .map(|v| v.render())
        .or_else(|| directive.and_then(|d| d.config_uri.clone()))
        .or_else(|| ctx.default_log_uri.clone());
    let digit = directive
        .and_then(|d| d.level.as_deref())
        .and_then(level_digit)
        .or_else(|| {
            ctx.debug_level
                .map(|l| char::from_digit(u32::from(l.min(5)), 10).unwrap_or('3'))
        });
    (uri, digit)
}

/// The child argument contract, as ordered key/value pairs. The node
/// reference is always the final pair.
pub fn build_arguments(rec: &DeploymentRecord, ctx: &LaunchContext) -> Vec<(String, String)> {
    let mut args = Vec::new();
    args.push((PROFILE_NAME.to_string(), rec.package.spd_path.clone()));
    match rec.kind() {
        ComponentKind::Device => {
            args.push((DEVICE_ID.to_string(), rec.instantiation.id.clone()));
            args.push((DEVICE_LABEL.to_string(), rec.label().to_string()));
            if let Some(parent) = &rec.composite_parent {
                args.push((COMPOSITE_DEVICE_IOR.to_string(), parent.clone()));
            }
            if let Some(channel) = &ctx.event_channel {
                args.push((IDM_CHANNEL_IOR.to_string(), channel.clone()));
            }
        }
        ComponentKind::Service => {
            args.push((SERVICE_NAME.to_string(), rec.label().to_string()));
        }
    }

    let (log_uri, digit) = resolve_logging(rec, ctx);
    if let Some(uri) = log_uri {
        args.push((LOGGING_CONFIG_URI.to_string(), uri));
    }
    if let Some(digit) = digit {
        args.push((DEBUG_LEVEL.to_string(), digit.to_string()));
    }
    args.push((DOM_PATH.to_string(), ctx.node.scoped_path()));

    // Populated exec params, minus the logging pair emitted above
    for prop in rec.merged.of_kind(PropertyKinds::EXECPARAM) {
        if prop.id == LOGGING_CONFIG_URI || prop.id == DEBUG_LEVEL {
            continue;
        }
        if let Some(value) = prop.simple_value() {
            args.push((prop.id.clone(), value.render()));
        }
    }

    args.push((DEVICE_MGR_IOR.to_string(), ctx.node_ref.clone()));
    args
}
