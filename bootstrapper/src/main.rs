use clap::Parser as _;
use cluster_bootstrapper::cli::{Cli, Commands, StartCmd, StopCmd};
use cluster_bootstrapper::env::{state_dir_of, ClusterEnv};
use cluster_bootstrapper::logging::init_logging;
use cluster_bootstrapper::{bootstrap, BootstrapResult};
use dotenvy::dotenv;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Start { start_command } => start_cluster(start_command).await,
        Commands::Stop { stop_command } => stop_cluster(stop_command),
    };

    if let Err(e) = result {
        error!(error = %e, "bootstrap failed");
        std::process::exit(1);
    }
}

async fn start_cluster(start_cmd: &StartCmd) -> BootstrapResult<()> {
    let env = ClusterEnv::try_from(start_cmd)?;
    info!(testnet_dir = %env.testnet_dir.display(), state_dir = %env.state_dir.display(), "starting cluster");
    bootstrap::bootstrap(&env).await
}

fn stop_cluster(stop_cmd: &StopCmd) -> BootstrapResult<()> {
    let state_dir = state_dir_of(&stop_cmd.socket_path)?;
    bootstrap::stop(&state_dir)
}
