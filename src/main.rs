use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use quotaguard::config::{LogFormat, LoggingConfig, QuotaguardConfig};
use quotaguard::identity::{user_key, ClientFingerprint, IdentitySource, PeerAddress, Unidentified};
use quotaguard::ratelimit::{PolicyCatalog, PolicyName, RateLimiter};

/// Inspect and exercise the Quotaguard policy catalog.
#[derive(Debug, Parser)]
#[command(name = "quotaguard", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the catalog policies
    Policies,

    /// Run repeated checks for one caller and print each decision
    Check {
        /// Policy to check against
        #[arg(short, long)]
        policy: PolicyName,

        /// Authenticated user id
        #[arg(long)]
        user_id: Option<String>,

        /// User agent for anonymous fingerprinting
        #[arg(long, default_value = "")]
        user_agent: String,

        /// Screen resolution for anonymous fingerprinting, e.g. 1920x1080
        #[arg(long, default_value = "")]
        screen: String,

        /// Peer address to key anonymous callers by
        #[arg(long, conflicts_with_all = ["user_agent", "screen"])]
        ip: Option<IpAddr>,

        /// Number of checks to run
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },

    /// Read caller keys from stdin and print a decision per line
    Replay {
        /// Policy to check against
        #[arg(short, long)]
        policy: PolicyName,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = QuotaguardConfig::load(cli.config.as_deref())?;

    init_tracing(&config.logging);
    debug!(version = env!("CARGO_PKG_VERSION"), "Configuration loaded");

    let catalog = PolicyCatalog::from_config(&config.catalog)?;

    match cli.command {
        Command::Policies => print_policies(&catalog),
        Command::Check {
            policy,
            user_id,
            user_agent,
            screen,
            ip,
            times,
        } => {
            let source: Box<dyn IdentitySource> = match ip {
                Some(ip) => Box::new(PeerAddress(ip)),
                None if user_agent.is_empty() && screen.is_empty() => Box::new(Unidentified),
                None => Box::new(ClientFingerprint::new(user_agent, screen)),
            };
            let key = user_key(user_id.as_deref(), source.as_ref());
            info!(policy = %policy, key = %key, "Running checks");

            run_checks(catalog.get(policy), &key, times)
        }
        Command::Replay { policy } => {
            if config.sweeper.enabled {
                catalog.get(policy).start_cleanup(config.sweeper.interval())?;
            }

            let input = BufReader::new(tokio::io::stdin());
            let result = replay(catalog.get(policy), input, std::io::stdout()).await;
            catalog.stop_cleanup();
            result
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_policies(catalog: &PolicyCatalog) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{:<8} {:>12} {:>12}", "POLICY", "MAX", "WINDOW_MS")?;
    for (name, limiter) in catalog.iter() {
        let policy = limiter.policy();
        writeln!(
            out,
            "{:<8} {:>12} {:>12}",
            name,
            policy.max_requests(),
            policy.window().as_millis()
        )?;
    }
    Ok(())
}

fn run_checks(limiter: &RateLimiter, key: &str, times: u32) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    for _ in 0..times {
        let decision = limiter.check(key);
        writeln!(out, "{}", serde_json::to_string(&decision)?)?;
    }
    Ok(())
}

/// Check each key read from `input`, writing one JSON record per key to `out`.
async fn replay<R, W>(limiter: &RateLimiter, input: R, mut out: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let key = line.trim();
                if key.is_empty() {
                    continue;
                }

                let decision = limiter.check(key);
                let record = serde_json::json!({ "key": key, "decision": decision });
                writeln!(out, "{record}")?;
            }
            _ = &mut shutdown => break,
        }
    }

    info!(entries = limiter.entry_count(), "Replay finished");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping replay");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping replay");
        }
    }
}
