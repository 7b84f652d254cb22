use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use backup_archive::TarGzProducer;
use backup_catalog::Catalog;
use backup_core::CoreError;
use backup_rcon::{DirectRcon, DockerExec, RemoteControl};
use backup_store::S3Store;
use backup_utils::{ensure_parent_dir, lock_path_for};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod admin;
mod backup;
mod config;
mod lock;
mod logging;

use backup::{Orchestrator, Scheduler};
use config::{DaemonConfig, RemoteMode};

#[derive(Parser)]
#[command(name = "backupd")]
#[command(about = "Periodic world backups for running game servers", version)]
struct Cli {
    /// Path to the daemon configuration
    #[arg(short, long, env = "BACKUPD_CONFIG", default_value = "backupd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up every active instance on the configured interval (default)
    Run,
    /// Run a single backup pass and exit
    Once,
    /// Manage registered instances
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },
    /// List the saves of an instance
    Saves {
        container: String,
        /// Include deleted saves
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum InstanceCommand {
    /// Register a server
    Add {
        /// Container name used to reach the server
        #[arg(long)]
        container: String,
        /// World directory, relative to the working path
        #[arg(long)]
        dir: String,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        prefix: String,
        /// Absolute directory holding the world
        #[arg(long)]
        working_path: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// Turn keepInventory on while backing up
        #[arg(long)]
        keep_inventory: bool,
    },
    List,
    Enable { container: String },
    Disable { container: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(&config, false).await,
        Commands::Once => run_daemon(&config, true).await,
        Commands::Instance { command } => {
            let catalog = open_catalog(&config.database).await?;
            let result = match command {
                InstanceCommand::Add {
                    container,
                    dir,
                    bucket,
                    prefix,
                    working_path,
                    description,
                    keep_inventory,
                } => {
                    let args = admin::AddInstance {
                        container,
                        dir,
                        bucket,
                        prefix,
                        working_path,
                        description,
                        keep_inventory,
                    };
                    admin::add_instance(&catalog, args).await
                }
                InstanceCommand::List => admin::list_instances(&catalog).await,
                InstanceCommand::Enable { container } => {
                    admin::set_active(&catalog, &container, true).await
                }
                InstanceCommand::Disable { container } => {
                    admin::set_active(&catalog, &container, false).await
                }
            };
            catalog.close().await;
            result
        }
        Commands::Saves { container, all } => {
            let catalog = open_catalog(&config.database).await?;
            let result = admin::list_saves(&catalog, &container, all).await;
            catalog.close().await;
            result
        }
    }
}

async fn run_daemon(config: &DaemonConfig, once: bool) -> anyhow::Result<()> {
    logging::init(config.log_file.as_deref())?;

    let lock_path = lock_path_for(&config.database);
    ensure_parent_dir(&lock_path).context("creating database directory")?;
    let guard = match lock::acquire_lock(&lock_path) {
        Ok(guard) => guard,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            anyhow::bail!("another backupd holds {}", lock_path.display());
        }
        Err(e) => return Err(e).context("acquiring the daemon lock"),
    };
    info!("holding {}", guard.path().display());

    let remote = build_remote(config)?;
    let catalog = open_catalog(&config.database).await?;
    let store = S3Store::connect(&config.s3_settings())
        .await
        .map_err(|err| CoreError::MissingDependency(err.to_string()))?;
    let store = Arc::new(store);
    let archiver = Arc::new(TarGzProducer::new(config.archive.compression_level));

    let orchestrator = Orchestrator::new(
        remote,
        archiver,
        store,
        catalog.clone(),
        config.backup_policy(),
    );
    let mut scheduler = Scheduler::new(catalog.clone(), Arc::new(orchestrator), config.interval());

    info!(
        version = backup_core::pkg_version(),
        interval_minutes = config.interval_minutes,
        retention = config.retention,
        "backupd started"
    );
    let result = if once {
        scheduler.run_pass().await.map(|_| ())
    } else {
        scheduler.run(shutdown_signal()).await
    };
    catalog.close().await;
    result.context("backup scheduler stopped")
}

fn build_remote(config: &DaemonConfig) -> Result<Arc<dyn RemoteControl>, CoreError> {
    match config.remote.mode {
        RemoteMode::Docker => {
            let docker = DockerExec::new(&config.remote.docker_bin, config.remote.rcon_cli.as_str());
            if !docker.docker_bin().is_file() {
                return Err(CoreError::MissingDependency(format!(
                    "docker binary not found at {}",
                    docker.docker_bin().display()
                )));
            }
            Ok(Arc::new(docker))
        }
        RemoteMode::Rcon => Ok(Arc::new(DirectRcon::new())),
    }
}

async fn open_catalog(path: &Path) -> anyhow::Result<Catalog> {
    ensure_parent_dir(path).context("creating database directory")?;
    Catalog::open(path)
        .await
        .with_context(|| format!("opening catalog {}", path.display()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("could not listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
