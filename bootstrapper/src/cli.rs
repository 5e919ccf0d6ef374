use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cluster-bootstrapper",
    about = "Assemble and start a local testnet cluster (relay node + optional db-sync) under supervisord",
    long_about = "Assembles a fresh cluster state directory from pre-generated testnet artifacts, \
    starts the supervised processes, and blocks until the cluster is ready for queries.\n\n\
    Example:\n  \
    CLUSTER_NODE_SOCKET_PATH=/tmp/cluster/node.socket cluster-bootstrapper start /data/testnet"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble the state directory, launch the cluster and wait for readiness
    Start {
        #[command(flatten)]
        start_command: Box<StartCmd>,
    },
    /// Stop a running cluster by terminating the supervisor daemon
    Stop {
        #[command(flatten)]
        stop_command: Box<StopCmd>,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct StartCmd {
    /// Directory holding the pre-generated testnet state (faucet credentials,
    /// genesis files, supervisor template, optional warm chain db)
    #[arg(value_name = "TESTNET_DIR")]
    pub testnet_dir: PathBuf,

    /// Node control socket path; its parent directory becomes the cluster
    /// state directory
    #[arg(long, env = "CLUSTER_NODE_SOCKET_PATH", value_name = "PATH")]
    pub socket_path: PathBuf,

    /// db-sync installation directory; leaving this unset disables the
    /// indexer entirely
    #[arg(long, env = "DBSYNC_REPO", value_name = "DIR")]
    pub dbsync_repo: Option<PathBuf>,

    /// Directory of override node config/topology files, preferred over the
    /// testnet directory copies when present
    #[arg(long, env = "CLUSTER_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Port injected into the node config EKG metrics field
    #[arg(long, default_value_t = 12788, value_name = "PORT")]
    pub ekg_port: u16,

    /// Port injected into the node config Prometheus metrics field
    #[arg(long, default_value_t = 12798, value_name = "PORT")]
    pub prometheus_port: u16,
}

#[derive(Parser, Debug, Clone)]
pub struct StopCmd {
    /// Node control socket path; locates the state directory of the cluster
    /// to stop
    #[arg(long, env = "CLUSTER_NODE_SOCKET_PATH", value_name = "PATH")]
    pub socket_path: PathBuf,
}
