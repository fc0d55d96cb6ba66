use crate::commands::{run_evaluate, run_replay, run_stats, EvaluateArgs, ReplayArgs, StatsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use labqc::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "labqc",
    about = "Evaluate laboratory control runs against Westgard rules",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Classify a single control measurement
    Evaluate(EvaluateArgs),
    /// Descriptive statistics for a list of values
    Stats(StatsArgs),
    /// Replay archived control runs against a lot sheet
    Replay(ReplayArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Lot sheet CSV (equipment,lot,level,analyte,mean,sd,unit) providing baselines
    #[arg(long, env = "APP_QC_LOTS_CSV")]
    pub(crate) lots: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluate(args),
        Command::Stats(args) => run_stats(args),
        Command::Replay(args) => run_replay(args),
    }
}
