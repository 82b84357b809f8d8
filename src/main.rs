use clap::Parser;
use debug_mediator::daemon::SessionDaemon;
use debug_mediator::persistence::SESSION_FILE;
use debug_mediator::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "debug-mediatord")]
#[command(about = "Session daemon unifying DAP and CDP debugging behind one TCP protocol", version)]
struct Cli {
    /// TCP port to listen on; 0 lets the OS pick a free port
    #[arg(long)]
    port: u16,

    /// Language tag for the program being debugged: "py-runtime" or "js-runtime"
    #[arg(long)]
    language: String,

    /// Path to the program to launch
    #[arg(long)]
    program: String,

    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let daemon = SessionDaemon::new(cli.port, PathBuf::from(SESSION_FILE));
    daemon.start_and_serve(&cli.program, &cli.language).await?;

    Ok(())
}
