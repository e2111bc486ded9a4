use clap::{ArgAction, Parser};
use tokio::io::AsyncReadExt;

use lornews::client::DEFAULT_TIMEOUT_SECS;
use lornews::config::Config;
use lornews::poster;

/// Read one news article on stdin and submit it to the Forum.
#[derive(Parser)]
#[command(name = "lorpost", version, disable_version_flag = true)]
struct Args {
    /// HTTP timeout in seconds
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

// Cookie and store access serialize on this one thread; signal masking
// during writes relies on it.
fn parse_args() -> Args {
    Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = parse_args();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lorpost: {e}");
            std::process::exit(1);
        }
    };

    let mut input = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut input).await {
        eprintln!("lorpost: {e}");
        std::process::exit(1);
    }

    let timeout = std::time::Duration::from_secs(args.timeout);
    if let Err(e) = poster::run(&config, &input, timeout).await {
        eprintln!("lorpost: {e}");
        std::process::exit(1);
    }
}
