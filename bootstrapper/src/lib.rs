//! Local testnet cluster bootstrapper.
//!
//! Assembles a state directory from pre-generated testnet artifacts, starts
//! the relay node (and optionally the db-sync indexer) under supervisord, and
//! blocks until the cluster is usable: control socket present, chain replay
//! finished, tip advancing at real-time speed, indexer caught up.

pub mod bootstrap;
pub mod cli;
pub mod dbsync;
pub mod env;
pub mod error;
pub mod logging;
pub mod node;
pub mod node_config;
pub mod readiness;
pub mod scripts;
pub mod state_dir;
pub mod supervisor;

pub use error::{BootstrapError, BootstrapResult};
