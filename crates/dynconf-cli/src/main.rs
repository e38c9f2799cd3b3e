//! dynconf - inspect and watch dynamic configuration sources

mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dynconf_common::parse_duration;
use dynconf_config::{Manager, ManagerOptions, Provider};
use dynconf_providers::{DotenvProvider, EnvProvider, LayeredProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level or filter directive
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Where configuration is read from
#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Dotenv file to read
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Ignore the process environment and read only the dotenv file
    #[arg(long, requires = "file")]
    file_only: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current keys, and values when asked
    Show {
        #[command(flatten)]
        source: SourceArgs,

        /// Only print keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Print values as well as keys
        #[arg(long)]
        reveal: bool,
    },
    /// Keep the given keys bound and print them whenever they change
    Watch {
        #[command(flatten)]
        source: SourceArgs,

        /// Keys to watch; all must be present
        #[arg(short, long = "key", required = true)]
        keys: Vec<String>,

        /// Poll cadence of the manager (e.g. `10s`, `1m30s`)
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Bound on a single fetch
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn open_source(source: &SourceArgs) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match (&source.file, source.file_only) {
        (Some(path), true) => Arc::new(
            DotenvProvider::new(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (Some(path), false) => Arc::new(
            LayeredProvider::new(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, _) => Arc::new(EnvProvider::new()),
    };
    Ok(provider)
}

fn show(source: &SourceArgs, prefix: Option<&str>, reveal: bool) -> Result<()> {
    let snapshot = open_source(source)?.config()?;
    let mut entries: Vec<_> = snapshot
        .iter()
        .filter(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)))
        .collect();
    entries.sort_unstable();

    for (key, value) in entries {
        if reveal {
            println!("{key}={value}");
        } else {
            println!("{key}");
        }
    }
    Ok(())
}

async fn run_watch(
    source: &SourceArgs,
    keys: Vec<String>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
) -> Result<()> {
    let provider = open_source(source)?;

    // the source may carry DYNCONF_* settings; flags take precedence
    let mut options = ManagerOptions::from_snapshot(&provider.config()?)
        .context("Invalid manager settings in the configuration source")?;
    if let Some(interval) = interval {
        options = options.with_fetch_interval(interval);
    }
    if let Some(timeout) = timeout {
        options = options.with_fetch_timeout(timeout);
    }
    let (options, errors) = options.with_error_channel();
    let poll = options.fetch_interval.min(Duration::from_secs(1));

    let manager = Manager::with_provider(provider, options)?;
    let handle = watch::register(&manager, keys)?;
    manager.start()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
        }
        info!("Received shutdown signal, stopping");
    };
    let changes = watch::run(handle, errors, poll, shutdown).await?;

    manager.shutdown().await?;
    info!(changes, "Watch finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    match args.command {
        Command::Show {
            source,
            prefix,
            reveal,
        } => show(&source, prefix.as_deref(), reveal),
        Command::Watch {
            source,
            keys,
            interval,
            timeout,
        } => run_watch(&source, keys, interval, timeout).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_arguments() {
        let args = Args::try_parse_from([
            "dynconf", "watch", "--file", "app.env", "-k", "TEST1", "--key", "TEST2", "--interval", "1m30s",
        ])
        .unwrap();

        match args.command {
            Command::Watch {
                source,
                keys,
                interval,
                timeout,
            } => {
                assert_eq!(source.file, Some(PathBuf::from("app.env")));
                assert!(!source.file_only);
                assert_eq!(keys, vec!["TEST1", "TEST2"]);
                assert_eq!(interval, Some(Duration::from_secs(90)));
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_watch_needs_a_key() {
        assert!(Args::try_parse_from(["dynconf", "watch"]).is_err());
    }

    #[test]
    fn test_file_only_requires_file() {
        assert!(Args::try_parse_from(["dynconf", "show", "--file-only"]).is_err());
        assert!(Args::try_parse_from(["dynconf", "show", "--file", ".env", "--file-only"]).is_ok());
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        assert!(Args::try_parse_from(["dynconf", "watch", "-k", "A", "--interval", "soon"]).is_err());
    }

    #[test]
    fn test_show_reads_dotenv_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.env");
        std::fs::write(&path, "A=1\nB=2\n").unwrap();
        let source = SourceArgs {
            file: Some(path.clone()),
            file_only: true,
        };
        assert!(show(&source, Some("A"), true).is_ok());
        std::fs::remove_file(&path).unwrap();
        assert!(show(&source, None, false).is_err());
    }
}
