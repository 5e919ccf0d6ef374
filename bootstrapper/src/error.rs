use std::path::PathBuf;

use thiserror::Error;

/// Result type for bootstrapper operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Captures the `file:line` of a failing check so hard-fail diagnostics name
/// their source.
#[macro_export]
macro_rules! check_site {
    () => {
        concat!(file!(), ":", line!())
    };
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The supervisord pid file is already present in the state directory.
    #[error("cluster already running: pid file {pid_file} exists, stop the running cluster first ({site})")]
    ClusterAlreadyRunning { pid_file: PathBuf, site: &'static str },

    /// A file the testnet directory is required to provide is absent.
    #[error("missing required testnet input {path} ({site})")]
    MissingInput { path: PathBuf, site: &'static str },

    /// DBSYNC_REPO was set but the indexer binary is not where it points.
    #[error("db-sync binary not found at {path} ({site})")]
    IndexerBinaryMissing { path: PathBuf, site: &'static str },

    /// The node control socket never appeared within the polling budget.
    #[error("node socket {path} still absent after {attempts} attempts ({site})")]
    SocketNeverAppeared { path: PathBuf, attempts: usize, site: &'static str },

    /// The socket path has no parent directory to use as the state directory.
    #[error("socket path {0} has no usable parent directory")]
    UnusableSocketPath(PathBuf),

    #[error("failed to patch node config {path}: {reason}")]
    ConfigPatch { path: PathBuf, reason: String },

    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("chain tip query failed: {0}")]
    TipQuery(String),

    #[error("indexer height query failed: {0}")]
    IndexerQuery(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BootstrapError {
    /// Wraps an IO error with a human-readable description of what was being
    /// done to which path.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> BootstrapError {
        let context = context.into();
        move |source| BootstrapError::Io { context, source }
    }
}
