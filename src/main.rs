//! Stackweld CLI: multi-provider infrastructure plan synthesis.

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "stackweld",
    version,
    about = "Multi-provider infrastructure synthesis: typed resources, explicit references, deterministic plans"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: stackweld::cli::Commands,
}

/// Logs go to stderr so plan JSON on stdout stays machine-readable.
/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stackweld={}", level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = stackweld::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
