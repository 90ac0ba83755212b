/*!
 * nodemgr
 * Deploys and supervises one SDR node from its configuration document
 */

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};
use sdr_node::core::types::NodeIdentity;
use sdr_node::descriptor::{DescriptorStore, JsonDescriptorStore, LocalFileStore};
use sdr_node::node::{signals, NodeManager, NodeManagerConfig};
use sdr_node::registry::{HealthMonitor, LoopbackRegistry, RemoteRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "nodemgr", about = "SDR node deployment manager", version)]
struct Args {
    /// Store path of the node configuration document
    #[arg(short = 'c', long = "node-config")]
    node_config: String,

    /// Domain this node joins
    #[arg(long, default_value = "SDR_DOMAIN")]
    domain_name: String,

    /// Root directory of the profile and artifact store
    #[arg(long, env = "SDRROOT")]
    sdr_root: PathBuf,

    /// Cache directory for child working directories (defaults under the
    /// store root)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Default logging configuration URI handed to children
    #[arg(long)]
    log_config: Option<String>,

    /// Verbosity, 0 (off) through 5 (trace)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=5))]
    debug_level: u8,

    /// CPUs children should avoid, comma separated
    #[arg(long, value_delimiter = ',')]
    cpu_exclude: Vec<u32>,

    /// Derive per-child logging URIs from the node's scoped path when no
    /// explicit configuration is given
    #[arg(long)]
    use_log_resolver: bool,
}

fn level_filter(debug_level: u8) -> LevelFilter {
    match debug_level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(level_filter(args.debug_level))
        .init();
    signals::install().context("installing signal handlers")?;

    let files = LocalFileStore::new(&args.sdr_root);
    let store = Arc::new(JsonDescriptorStore::new(files.clone()));

    let node_config = store
        .load_node_config(&args.node_config)
        .context("loading node configuration")?;
    let identity = NodeIdentity::new(
        node_config.id.clone(),
        node_config.name.clone(),
        node_config
            .domain_name
            .clone()
            .unwrap_or_else(|| args.domain_name.clone()),
    );
    if !args.cpu_exclude.is_empty() {
        info!("children asked to avoid CPUs {:?}", args.cpu_exclude);
    }

    let default_log_uri = args.log_config.clone().or_else(|| {
        args.use_log_resolver
            .then(|| format!("sca://{}/logging.properties", identity.scoped_path()))
    });
    let config = NodeManagerConfig {
        identity,
        node_config_path: args.node_config.clone(),
        cache_root: args.cache.unwrap_or_else(|| args.sdr_root.join("dev")),
        default_log_uri,
        debug_level: Some(args.debug_level),
        event_channel: None,
        registry_retry: Duration::from_secs(1),
    };

    let registry: Arc<dyn RemoteRegistry> = Arc::new(LoopbackRegistry::new());
    let manager = NodeManager::new(config, store, Arc::new(files), Arc::clone(&registry));

    let reaper = manager
        .supervisor()
        .start_reaper(manager.shutdown_flag())
        .context("starting reaper thread")?;
    let monitor = {
        let manager = Arc::clone(&manager);
        HealthMonitor::spawn(
            registry,
            manager.shutdown_flag(),
            Duration::from_secs(5),
            move || manager.reset_registrations(),
        )
    };

    let launched = manager.deploy().context("deploying node")?;
    info!("node up with {} launched units", launched);

    manager.run(manager.supervisor().exit_events());

    let _ = reaper.join();
    monitor.join();
    Ok(())
}
