use std::path::PathBuf;
use std::process::Command;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{BootstrapError, BootstrapResult};

/// Most recent block/slot known to the relay node.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChainTip {
    pub slot: u64,
    pub block: u64,
}

/// Seam between readiness logic and the running node, so the waits can be
/// driven by scripted tips in tests.
#[async_trait]
pub trait TipSource: Send + Sync {
    async fn query_tip(&self) -> BootstrapResult<ChainTip>;
}

/// Queries the tip through the node's companion CLI over the control socket.
pub struct NodeCli {
    binary: PathBuf,
    socket_path: PathBuf,
}

impl NodeCli {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { binary: PathBuf::from("cardano-cli"), socket_path: socket_path.into() }
    }
}

#[async_trait]
impl TipSource for NodeCli {
    async fn query_tip(&self) -> BootstrapResult<ChainTip> {
        let output = Command::new(&self.binary)
            .args(["query", "tip"])
            .env("CLUSTER_NODE_SOCKET_PATH", &self.socket_path)
            .output()
            .map_err(|e| BootstrapError::TipQuery(format!("failed to run {}: {e}", self.binary.display())))?;
        if !output.status.success() {
            return Err(BootstrapError::TipQuery(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| BootstrapError::TipQuery(format!("malformed tip output: {e}")))
    }
}
