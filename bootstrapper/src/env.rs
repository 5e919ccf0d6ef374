use std::path::PathBuf;

use crate::cli::StartCmd;
use crate::error::{BootstrapError, BootstrapResult};

/// Deployment parameters for one bootstrap run.
///
/// Built once at entry from the CLI/environment and threaded through every
/// step; nothing below this layer reads the process environment.
#[derive(Debug, Clone)]
pub struct ClusterEnv {
    pub testnet_dir: PathBuf,
    /// Working directory for the cluster, derived from the socket path.
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    /// Unset means the indexer feature is disabled.
    pub dbsync_repo: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub ekg_port: u16,
    pub prometheus_port: u16,
}

impl TryFrom<&StartCmd> for ClusterEnv {
    type Error = BootstrapError;

    fn try_from(cmd: &StartCmd) -> BootstrapResult<Self> {
        let state_dir = state_dir_of(&cmd.socket_path)?;
        Ok(Self {
            testnet_dir: cmd.testnet_dir.clone(),
            state_dir,
            socket_path: cmd.socket_path.clone(),
            dbsync_repo: cmd.dbsync_repo.clone(),
            config_dir: cmd.config_dir.clone(),
            ekg_port: cmd.ekg_port,
            prometheus_port: cmd.prometheus_port,
        })
    }
}

/// The state directory is the socket path's parent. A socket directly under
/// the filesystem root (or a bare relative name) has no usable parent.
pub fn state_dir_of(socket_path: &std::path::Path) -> BootstrapResult<PathBuf> {
    match socket_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Err(BootstrapError::UnusableSocketPath(socket_path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use std::path::Path;

    use super::*;

    #[test]
    fn state_dir_is_socket_parent() {
        let dir = state_dir_of(Path::new("/tmp/cluster/node.socket")).unwrap();
        assert_eq!(dir, Path::new("/tmp/cluster"));
    }

    #[test]
    fn bare_socket_name_is_rejected() {
        assert_matches!(
            state_dir_of(Path::new("node.socket")),
            Err(BootstrapError::UnusableSocketPath(_))
        );
    }
}
