//! Optional db-sync indexer support.
//!
//! The indexer mirrors on-chain data into a relational store and always runs
//! behind the node's tip. It must not come up against a chain that is still
//! replaying or bulk-syncing, so its supervisor stanza is appended with
//! `autostart=false` and the program is only started once the tip has
//! stabilized.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::check_site;
use crate::env::ClusterEnv;
use crate::error::{BootstrapError, BootstrapResult};
use crate::node::TipSource;
use crate::readiness::{poll_until, PollOutcome};
use crate::state_dir::copy_dir_recursive;
use crate::supervisor::{ProgramEntry, SupervisorHandle};

pub const DBSYNC_PROGRAM: &str = "dbsync";
/// Paths inside the db-sync installation directory.
const DBSYNC_BIN: &str = "bin/cardano-db-sync";
const DBSYNC_HEIGHT_HELPER: &str = "bin/dbsync-height";
const DBSYNC_CONFIG_SRC: &str = "config/dbsync-config.json";

pub const DBSYNC_CONFIG: &str = "dbsync-config.json";
/// Pre-supplied indexer database state, testnet-dir name and state-dir name.
pub const DBSYNC_DB_SRC: &str = "dbsync-db";
pub const DBSYNC_DB_DEST: &str = "db-dbsync";

/// Grace period between `supervisorctl start dbsync` and the first height
/// comparison.
pub const POST_START_DELAY: Duration = Duration::from_secs(10);
pub const SYNC_MAX_ATTEMPTS: usize = 600;
pub const SYNC_PROBE_LEAD: Duration = Duration::from_secs(5);
pub const SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Seam for reading the indexer's current indexed block height.
#[async_trait]
pub trait IndexerProbe: Send + Sync {
    async fn indexed_height(&self) -> BootstrapResult<u64>;
}

/// Reads the height through the helper binary the db-sync installation
/// ships.
pub struct DbSyncHeightHelper {
    helper: PathBuf,
}

#[async_trait]
impl IndexerProbe for DbSyncHeightHelper {
    async fn indexed_height(&self) -> BootstrapResult<u64> {
        let output = Command::new(&self.helper)
            .output()
            .map_err(|e| BootstrapError::IndexerQuery(format!("failed to run {}: {e}", self.helper.display())))?;
        if !output.status.success() {
            return Err(BootstrapError::IndexerQuery(format!(
                "{} exited with {}",
                self.helper.display(),
                output.status
            )));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| BootstrapError::IndexerQuery(format!("malformed height output: {e}")))
    }
}

/// An enabled indexer, staged into the state directory and registered with
/// the supervisor but not yet started.
#[derive(Debug)]
pub struct DbSync {
    repo: PathBuf,
}

impl DbSync {
    /// Validates the installation, stages config and any pre-supplied
    /// database state, and appends the non-autostart supervisor stanza.
    ///
    /// A missing binary is one of the bootstrap's hard-fail points: better to
    /// abort before any process is launched than to discover it after the
    /// node is up.
    pub fn enable(env: &ClusterEnv, supervisor: &SupervisorHandle, repo: &Path) -> BootstrapResult<Self> {
        let binary = repo.join(DBSYNC_BIN);
        if !binary.is_file() {
            return Err(BootstrapError::IndexerBinaryMissing { path: binary, site: check_site!() });
        }
        info!(repo = %repo.display(), "db-sync enabled");

        let config_src = repo.join(DBSYNC_CONFIG_SRC);
        let config_dest = env.state_dir.join(DBSYNC_CONFIG);
        let staged_config = if config_src.is_file() {
            std::fs::copy(&config_src, &config_dest)
                .map_err(BootstrapError::io(format!("copying {}", config_src.display())))?;
            Some(&config_dest)
        } else {
            warn!(src = %config_src.display(), "db-sync config not found, relying on built-in defaults");
            None
        };

        let db_src = env.testnet_dir.join(DBSYNC_DB_SRC);
        if db_src.is_dir() {
            let db_dest = env.state_dir.join(DBSYNC_DB_DEST);
            copy_dir_recursive(&db_src, &db_dest)
                .map_err(BootstrapError::io(format!("copying {}", db_src.display())))?;
            debug!("staged pre-supplied db-sync state");
        }

        let mut command = binary.display().to_string();
        if let Some(config) = staged_config {
            command.push_str(&format!(" --config {}", config.display()));
        }
        command.push_str(&format!(
            " --socket-path {} --state-dir {}",
            env.socket_path.display(),
            env.state_dir.join(DBSYNC_DB_DEST).display(),
        ));

        supervisor.append_program(&ProgramEntry {
            name: DBSYNC_PROGRAM.into(),
            command,
            stdout_logfile: env.state_dir.join("dbsync.stdout"),
            stderr_logfile: env.state_dir.join("dbsync.stderr"),
            autostart: false,
        })?;
        Ok(Self { repo: repo.to_path_buf() })
    }

    /// Starts the indexer and blocks until its height reaches the node's tip
    /// (or the polling budget runs out, in which case the cluster is handed
    /// over with the indexer still catching up).
    pub async fn start_and_wait(&self, supervisor: &SupervisorHandle, tip: &dyn TipSource) -> BootstrapResult<()> {
        supervisor.start_program(DBSYNC_PROGRAM)?;
        sleep(POST_START_DELAY).await;

        let probe = DbSyncHeightHelper { helper: self.repo.join(DBSYNC_HEIGHT_HELPER) };
        match wait_for_indexer_sync(tip, &probe).await {
            PollOutcome::Converged { attempts } => {
                info!(attempts, "db-sync caught up with the node tip");
            }
            PollOutcome::TimedOut => {
                debug!("db-sync sync wait exhausted, proceeding with indexer still behind");
            }
        }
        Ok(())
    }
}

/// One comparison per iteration: short lead sleep, then node height vs
/// indexed height, done as soon as the indexer has caught up or overtaken.
pub async fn wait_for_indexer_sync(tip: &dyn TipSource, indexer: &dyn IndexerProbe) -> PollOutcome {
    info!("waiting for db-sync to reach the node tip");
    poll_until(SYNC_MAX_ATTEMPTS, SYNC_INTERVAL, move || async move {
        sleep(SYNC_PROBE_LEAD).await;
        let node_height = tip.query_tip().await?.block;
        let indexed = indexer.indexed_height().await?;
        debug!(node_height, indexed, "db-sync height comparison");
        Ok(indexed >= node_height)
    })
    .await
}
