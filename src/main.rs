mod blobs;
mod bundle;
mod config;
mod controller;
mod error;
mod history;
mod ids;
mod logging;
mod mute;
mod version_list;
mod watch;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use blobs::BlobPool;
use config::Config;
use controller::VersionController;
use error::Result;
use version_list::VersionList;
use watch::ChangeDetector;

#[derive(Parser)]
#[command(
    name = "distribox",
    version,
    about = "Peer-to-peer file synchronizer with per-file version history"
)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the metadata directory and a default config under a sync root
    Init {
        /// Directory to synchronize; defaults to the current directory
        #[arg(default_value = ".")]
        sync_root: PathBuf,
    },
    /// Watch a sync root and record every change to its Version List
    Watch {
        #[arg(default_value = ".")]
        sync_root: PathBuf,
    },
    /// Show a summary of the Version List
    Status {
        #[arg(default_value = ".")]
        sync_root: PathBuf,
    },
    /// Show the event history of one file
    History {
        #[arg(default_value = ".")]
        sync_root: PathBuf,
        /// Current name of the file
        name: String,
    },
    /// Build or accept a Delta Bundle (the manual stand-in for a transport
    /// collaborator sending/receiving one over the network)
    Bundle {
        #[command(subcommand)]
        command: BundleCommand,
    },
}

#[derive(Subcommand)]
enum BundleCommand {
    /// Package every alive history (or just the named ones) into a bundle
    Build {
        #[arg(default_value = ".")]
        sync_root: PathBuf,
        out: PathBuf,
        /// Limit the bundle to these current names; defaults to everything
        #[arg(long = "name")]
        names: Vec<String>,
    },
    /// Merge a bundle's histories into this peer's Version List and
    /// replay the implied filesystem changes
    Accept {
        #[arg(default_value = ".")]
        sync_root: PathBuf,
        bundle: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    match cli.command {
        Commands::Init { sync_root } => run_init(&sync_root),
        Commands::Watch { sync_root } => run_watch(&sync_root),
        Commands::Status { sync_root } => run_status(&sync_root),
        Commands::History { sync_root, name } => run_history(&sync_root, &name),
        Commands::Bundle { command } => match command {
            BundleCommand::Build {
                sync_root,
                out,
                names,
            } => run_bundle_build(&sync_root, &out, &names),
            BundleCommand::Accept { sync_root, bundle } => run_bundle_accept(&sync_root, &bundle),
        },
    }
}

fn open_peer(sync_root: &PathBuf) -> Result<(Config, BlobPool, VersionList)> {
    let cfg = Config::load(sync_root)?;
    let blobs = BlobPool::open(cfg.blob_pool_dir())?;
    let versions = VersionList::open(cfg.version_list_path())?;
    Ok((cfg, blobs, versions))
}

fn run_init(sync_root: &PathBuf) -> Result<()> {
    let cfg = Config::default_for(sync_root);
    std::fs::create_dir_all(cfg.metadata_dir())?;
    std::fs::create_dir_all(cfg.blob_pool_dir())?;
    cfg.save()?;
    VersionList::open(cfg.version_list_path())?.flush()?;
    tracing::info!(sync_root = %cfg.sync_root.display(), "initialized sync root");
    println!("initialized {}", cfg.sync_root.display());
    Ok(())
}

fn run_watch(sync_root: &PathBuf) -> Result<()> {
    let (cfg, blobs, versions) = open_peer(sync_root)?;
    let detector = ChangeDetector::watch(
        &cfg.sync_root,
        &cfg.metadata_dir_name,
        Duration::from_millis(cfg.poll_interval_ms),
        blobs,
    )?;
    let mut controller = VersionController::new(versions);
    tracing::info!(sync_root = %cfg.sync_root.display(), "watching for changes");
    controller.run(&detector)?;
    Ok(())
}

fn run_status(sync_root: &PathBuf) -> Result<()> {
    let (_, _, versions) = open_peer(sync_root)?;
    let stats = versions.stats();
    println!(
        "histories: {} total, {} alive",
        stats.total_histories, stats.alive_histories
    );
    Ok(())
}

fn run_history(sync_root: &PathBuf, name: &str) -> Result<()> {
    let (_, _, versions) = open_peer(sync_root)?;
    let Some(history) = versions.alive_by_name(name) else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no alive history at {name}"),
        )
        .into());
    };
    for event in history.events() {
        println!(
            "{} {:?} name={} sha1={} size={} when={}",
            event.event_id,
            event.kind,
            event.name,
            event.sha1.as_deref().unwrap_or("-"),
            event.size,
            event.when
        );
    }
    Ok(())
}

fn run_bundle_build(sync_root: &PathBuf, out: &PathBuf, names: &[String]) -> Result<()> {
    let (_, blobs, versions) = open_peer(sync_root)?;
    let histories: Vec<_> = if names.is_empty() {
        versions.histories().cloned().collect()
    } else {
        names
            .iter()
            .filter_map(|name| versions.alive_by_name(name))
            .cloned()
            .collect()
    };
    bundle::build(&histories, &blobs, out)?;
    println!(
        "wrote bundle with {} histories to {}",
        histories.len(),
        out.display()
    );
    Ok(())
}

fn run_bundle_accept(sync_root: &PathBuf, bundle_path: &PathBuf) -> Result<()> {
    let (cfg, blobs, mut versions) = open_peer(sync_root)?;
    let report = bundle::accept(bundle_path, &blobs, &mut versions, &cfg.sync_root)?;
    println!(
        "merged {} histories, applied {} replays",
        report.histories_merged, report.replays_applied
    );
    Ok(())
}
