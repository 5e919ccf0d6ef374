//! State directory assembly.
//!
//! Recreates the cluster working directory from scratch on every run and
//! stages everything the supervised processes expect to find in it: faucet
//! credentials, genesis files with per-era symlinks, node config/topology,
//! the supervisord conf template, and (when available) a warm relay database.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::check_site;
use crate::env::ClusterEnv;
use crate::error::{BootstrapError, BootstrapResult};
use crate::supervisor::SUPERVISOR_CONF;

pub const ERAS: &[&str] = &["byron", "shelley", "alonzo", "conway"];

pub const NODE_CONFIG: &str = "config-relay1.json";
pub const NODE_TOPOLOGY: &str = "topology-relay1.json";
pub const RELAY_STDOUT_LOG: &str = "relay1.stdout";

/// Pre-synced relay database, as named in the testnet dir and in the state
/// dir respectively.
pub const CHAIN_DB_SRC: &str = "relay1-db";
pub const CHAIN_DB_DEST: &str = "db-relay1";

const FAUCET_FILES: &[&str] = &["faucet.addr", "faucet.skey"];

/// Recreates the state directory (prior contents discarded) and copies in the
/// required testnet artifacts. Any missing required input aborts the assembly
/// rather than leaving a partially configured cluster behind.
pub fn assemble(env: &ClusterEnv) -> BootstrapResult<()> {
    let state_dir = &env.state_dir;
    if state_dir.exists() {
        std::fs::remove_dir_all(state_dir)
            .map_err(BootstrapError::io(format!("clearing {}", state_dir.display())))?;
    }
    std::fs::create_dir_all(state_dir)
        .map_err(BootstrapError::io(format!("creating {}", state_dir.display())))?;
    info!(state_dir = %state_dir.display(), "assembling state directory");

    for name in FAUCET_FILES {
        copy_required(&env.testnet_dir.join(name), &state_dir.join(name))?;
    }

    for era in ERAS {
        let genesis = format!("genesis-{era}.json");
        copy_required(&env.testnet_dir.join(&genesis), &state_dir.join(&genesis))?;

        // the node resolves era genesis files at <era>/genesis.json
        let era_dir = state_dir.join(era);
        std::fs::create_dir_all(&era_dir)
            .map_err(BootstrapError::io(format!("creating {}", era_dir.display())))?;
        let link = era_dir.join("genesis.json");
        std::os::unix::fs::symlink(Path::new("..").join(&genesis), &link)
            .map_err(BootstrapError::io(format!("linking {}", link.display())))?;
    }

    for name in [NODE_CONFIG, NODE_TOPOLOGY] {
        copy_required(&resolve_input(env, name), &state_dir.join(name))?;
    }
    copy_required(&env.testnet_dir.join(SUPERVISOR_CONF), &state_dir.join(SUPERVISOR_CONF))?;

    Ok(())
}

/// Copies the pre-synced relay database into the state directory so the node
/// starts warm. The snapshot is optional; without it the node replays from
/// genesis.
pub fn stage_chain_db(env: &ClusterEnv) -> BootstrapResult<()> {
    let src = env.testnet_dir.join(CHAIN_DB_SRC);
    if !src.is_dir() {
        info!(src = %src.display(), "no pre-synced chain db, node will start from genesis");
        return Ok(());
    }
    let dest = env.state_dir.join(CHAIN_DB_DEST);
    info!(src = %src.display(), dest = %dest.display(), "staging pre-synced chain db");
    copy_dir_recursive(&src, &dest)
        .map_err(BootstrapError::io(format!("copying {} to {}", src.display(), dest.display())))
}

/// Override config dir takes precedence over the testnet dir when it carries
/// the file.
fn resolve_input(env: &ClusterEnv, name: &str) -> PathBuf {
    if let Some(config_dir) = &env.config_dir {
        let candidate = config_dir.join(name);
        if candidate.is_file() {
            debug!(file = name, "using override config dir copy");
            return candidate;
        }
    }
    env.testnet_dir.join(name)
}

fn copy_required(src: &Path, dest: &Path) -> BootstrapResult<()> {
    if !src.is_file() {
        return Err(BootstrapError::MissingInput { path: src.to_path_buf(), site: check_site!() });
    }
    std::fs::copy(src, dest)
        .map_err(BootstrapError::io(format!("copying {} to {}", src.display(), dest.display())))?;
    Ok(())
}

pub(crate) fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
