use clap::{ArgAction, Parser};

use lornews::client::DEFAULT_TIMEOUT_SECS;
use lornews::config::Config;
use lornews::puller::{self, PullOptions};
use lornews::storage::Store;
use lornews::wildmat::Pattern;

/// Pull Forum topics and comments into the local article store.
#[derive(Parser)]
#[command(name = "lorpull", version, disable_version_flag = true)]
struct Args {
    /// Group pattern, e.g. `lor.forum.*,!lor.forum.job`
    pattern: Option<String>,

    /// Pull window in days; negative disables pulling
    #[arg(short = 'd', long = "days", default_value_t = 1, allow_hyphen_values = true)]
    pull_days: i64,

    /// Expire articles older than this many days; 0 expires all, negative
    /// disables expiry
    #[arg(short = 'e', long = "expire", default_value_t = -1, allow_hyphen_values = true)]
    expire_days: i64,

    /// HTTP timeout in seconds
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Log warnings only
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

// Index writes mask SIGINT on the running thread, so everything stays on
// one thread.
fn parse_args() -> Args {
    Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = parse_args();

    let default_filter = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let pattern = match args.pattern.as_deref().map(Pattern::parse).transpose() {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("lorpull: {e}");
            std::process::exit(1);
        }
    };

    let store = match Config::from_env().and_then(Store::open) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("lorpull: {e}");
            std::process::exit(1);
        }
    };

    let opts = PullOptions {
        pattern,
        pull_days: args.pull_days,
        expire_days: args.expire_days,
        timeout: std::time::Duration::from_secs(args.timeout),
    };
    if let Err(e) = puller::run(&store, &opts).await {
        eprintln!("lorpull: {e}");
        std::process::exit(1);
    }
}
