//! The bring-up procedure.
//!
//! One linear pass: preflight, state-directory assembly, supervisor launch,
//! then the readiness gates. The socket gate is the only fatal wait; the
//! replay, tip and indexer waits degrade to "proceed anyway" on exhaustion,
//! matching how the cluster has always been brought up.

use tracing::{debug, info};

use crate::dbsync::DbSync;
use crate::env::ClusterEnv;
use crate::error::BootstrapResult;
use crate::node::NodeCli;
use crate::readiness::{self, PollOutcome};
use crate::scripts;
use crate::state_dir::{self, RELAY_STDOUT_LOG};
use crate::supervisor::SupervisorHandle;

/// Everything up to (not including) process launch: mutual exclusion, state
/// dir assembly, config patch, optional indexer enablement, helper scripts,
/// chain db staging.
pub fn prepare(env: &ClusterEnv, supervisor: &SupervisorHandle) -> BootstrapResult<Option<DbSync>> {
    supervisor.ensure_not_running()?;
    state_dir::assemble(env)?;
    crate::node_config::patch_metrics_ports(
        &env.state_dir.join(state_dir::NODE_CONFIG),
        env.ekg_port,
        env.prometheus_port,
    )?;
    let dbsync = match &env.dbsync_repo {
        Some(repo) => Some(DbSync::enable(env, supervisor, repo)?),
        None => {
            debug!("DBSYNC_REPO unset, indexer disabled");
            None
        }
    };
    scripts::write_helper_scripts(&env.state_dir)?;
    state_dir::stage_chain_db(env)?;
    Ok(dbsync)
}

/// Brings the cluster up and blocks until it is ready.
pub async fn bootstrap(env: &ClusterEnv) -> BootstrapResult<()> {
    let supervisor = SupervisorHandle::new(&env.state_dir);
    let dbsync = prepare(env, &supervisor)?;

    supervisor.start_daemon()?;

    let relay_log = env.state_dir.join(RELAY_STDOUT_LOG);
    if let PollOutcome::TimedOut = readiness::wait_for_replay_completion(&relay_log).await? {
        // not a failure; the node keeps replaying in the background
        debug!("replay wait exhausted, proceeding");
    }

    readiness::wait_for_socket(&env.socket_path).await?;

    let tip = NodeCli::new(&env.socket_path);
    if let PollOutcome::TimedOut = readiness::wait_for_tip_stabilization(&tip).await {
        // covers both a tip still racing and a tip that never advanced at all
        debug!("tip stabilization wait exhausted, proceeding");
    }

    if let Some(dbsync) = dbsync {
        dbsync.start_and_wait(&supervisor, &tip).await?;
    }

    info!(
        "cluster is ready; stop it with {}",
        scripts::stop_script_path(&env.state_dir).display()
    );
    Ok(())
}

/// Tears down a running cluster: SIGTERM to the supervisor daemon by pid,
/// then pid-file removal.
pub fn stop(state_dir: &std::path::Path) -> BootstrapResult<()> {
    SupervisorHandle::new(state_dir).stop_daemon()
}
