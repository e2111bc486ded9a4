use clap::{ArgAction, Parser};

use lornews::config::Config;
use lornews::server;
use lornews::storage::Store;

/// NNTP server over the local lornews article store.
#[derive(Parser)]
#[command(name = "lord", version, disable_version_flag = true)]
struct Args {
    /// TCP port to listen on
    #[arg(short = 'p', long, default_value_t = server::DEFAULT_PORT)]
    port: u16,

    /// Command spawned to deliver a posted article
    #[arg(short = 'c', long = "postcmd", default_value = "lorpost")]
    post_command: String,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

fn parse_args() -> Args {
    Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    let store = match Config::from_env().and_then(Store::open) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("lord: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(store, args.port, args.post_command).await {
        eprintln!("lord: {e}");
        std::process::exit(1);
    }
}
