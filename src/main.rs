//! MFX Migrator CLI
//!
//! Thin command-line surface over the migration library:
//! - `claim` takes a work item from the remote queue (or a specific UUID)
//! - `migrate` drives a claimed work item to a terminal state
//! - `verify` reports the local and remote state of a work item
//!
//! Exit code is 0 on success and nonzero on any returned error; structured
//! logs go to stderr.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use uuid::Uuid;

use mfx_migrator::config::{AuthConfig, MigrationConfig, RemoteConfig};
use mfx_migrator::localstate::LocalStateError;
use mfx_migrator::store::Credentials;
use mfx_migrator::{
    ClaimEngine, HttpClient, LocalStateCache, ManifestCliClient, ManyClient,
    MigrationOrchestrator, WorkItemStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "mfx-migrator",
    author,
    version,
    about = "Migrate MFX tokens from the MANY ledger to the Manifest chain"
)]
struct Cli {
    /// Root URL of the work-item API server
    #[arg(long, global = true, default_value = "")]
    url: String,

    /// Neighborhood ID scoping the remote API
    #[arg(long, global = true, default_value_t = 2)]
    neighborhood: u64,

    /// Username for the work-item API
    #[arg(long, global = true, default_value = "")]
    username: String,

    /// Password for the work-item API
    #[arg(long, global = true, default_value = "")]
    password: String,

    /// Directory holding the local <uuid>.json state files
    #[arg(long, global = true, default_value = ".")]
    state_dir: PathBuf,

    /// Log level (debug|info|warn|error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Claim a work item from the database.
    ///
    /// Without --uuid, claims from the queue; an empty queue is a success.
    /// Claiming an item that is not in the created state requires --force.
    Claim {
        /// UUID of the work item to claim
        #[arg(long)]
        uuid: Option<Uuid>,

        /// Force re-claiming of a failed work item
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Execute the MFX token migration associated with the given UUID.
    Migrate {
        /// UUID of the work item to migrate
        #[arg(long)]
        uuid: Uuid,

        /// Path to the migration TOML configuration
        #[arg(long, default_value = "migrator.toml")]
        config: PathBuf,
    },

    /// Verify the local and remote status of a migration.
    Verify {
        /// UUID of the work item to verify
        #[arg(long)]
        uuid: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let remote = RemoteConfig {
        url: cli.url,
        neighborhood: cli.neighborhood,
    };
    remote.validate()?;

    let auth = AuthConfig {
        username: cli.username,
        password: cli.password,
    };
    auth.validate()?;

    let cache = LocalStateCache::new(&cli.state_dir);
    let http = HttpClient::new(remote.parsed_url()?)?;
    let store = WorkItemStore::new(http.clone(), remote.neighborhood);

    store
        .login(&Credentials {
            username: auth.username,
            password: auth.password,
        })
        .await?;

    match cli.command {
        Command::Claim { uuid, force } => {
            let engine = ClaimEngine::new(&store, &cache);
            match uuid {
                Some(uuid) => {
                    let item = engine.claim_by_uuid(uuid, force).await?;
                    info!(uuid = %item.uuid, status = %item.status, "work item claimed");
                }
                None => {
                    let items = engine.claim_from_queue().await?;
                    for item in &items {
                        info!(uuid = %item.uuid, status = %item.status, "work item claimed");
                    }
                }
            }
        }

        Command::Migrate { uuid, config } => {
            let migration = MigrationConfig::load(&config)?;
            let source = ManyClient::new(http, remote.neighborhood);
            let chain = ManifestCliClient::new(migration.chain.clone())?;

            let orchestrator =
                MigrationOrchestrator::new(&store, &cache, &source, &chain, &migration.token_map)
                    .with_whitelist(migration.verify_whitelist);

            let item = orchestrator.run(uuid).await?;
            info!(
                uuid = %item.uuid,
                hash = item.manifest_hash.as_deref().unwrap_or(""),
                "migration completed"
            );
        }

        Command::Verify { uuid } => {
            verify(&store, &cache, uuid).await?;
        }
    }

    Ok(())
}

/// Reports the local and remote state of a work item and fails if they have
/// diverged.
async fn verify(store: &WorkItemStore, cache: &LocalStateCache, uuid: Uuid) -> Result<()> {
    let local = match cache.load(uuid) {
        Ok(item) => Some(item),
        Err(LocalStateError::NotFound { .. }) => {
            warn!(%uuid, "no local state, continuing with the remote item only");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let remote = store.get(uuid).await?;
    info!(%uuid, status = %remote.status, "remote work item");

    if let Some(local) = local {
        info!(%uuid, status = %local.status, "local work item");
        if !local.equal_ignoring_status(&remote) {
            bail!("local and remote work items do not match: {uuid}");
        }
        info!(%uuid, "local and remote work items match");
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = match level {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("invalid log level: {other}. Valid log levels are: debug|info|warn|error"),
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
