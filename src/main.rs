use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use feedlink::config::ConnectorConfig;
use feedlink::feed::Poller;
use feedlink::publish::PublishDispatcher;
use feedlink::record::Record;

/// Records buffered between the poller and stdout.
const RECORD_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "feedlink", about = "Bridge Atom/RSS feeds and Atom Publishing Protocol endpoints", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the configured feed and print each entry as a JSON line
    Poll {
        /// Connector config file (TOML, needs a [source] table)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Run a single fetch and exit instead of polling on an interval
        #[arg(long)]
        once: bool,
    },
    /// Publish records to the configured AtomPub endpoint
    ///
    /// Without --field, reads one JSON object per line from stdin.
    Publish {
        /// Connector config file (TOML, needs a [sink] table)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Record field as key=value (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Poll { config, once } => poll(config, once).await,
        Command::Publish { config, fields } => publish(config, fields).await,
    }
}

fn load_config(path: &Path) -> Result<ConnectorConfig> {
    ConnectorConfig::load(path)
        .with_context(|| format!("Failed to load config file '{}'", path.display()))
}

async fn poll(config_path: PathBuf, once: bool) -> Result<()> {
    let source = load_config(&config_path)?
        .source_config()
        .context("Invalid [source] configuration")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedlink/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let mut poller = Poller::new(&source, client);
    let (tx, mut rx) = mpsc::channel::<Record>(RECORD_CHANNEL_CAPACITY);

    if once {
        let polling = async {
            let tx = tx;
            poller.poll_once(&tx).await
        };
        let printing = async {
            let stdout = std::io::stdout();
            while let Some(record) = rx.recv().await {
                print_record(&mut stdout.lock(), &record)?;
            }
            anyhow::Ok(())
        };
        let (delivered, printed) = tokio::join!(polling, printing);
        let delivered = delivered.with_context(|| format!("Failed to poll {}", source.url()))?;
        printed?;
        tracing::info!(delivered, "Single poll complete");
        return Ok(());
    }

    let _handle = poller.start(source.interval(), tx);
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            record = rx.recv() => {
                let Some(record) = record else { break };
                print_record(&mut stdout.lock(), &record)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping poller");
                break;
            }
        }
    }

    poller.stop();
    Ok(())
}

fn print_record(out: &mut impl Write, record: &Record) -> Result<()> {
    let line = serde_json::to_string(record).context("Failed to encode record")?;
    writeln!(out, "{line}").context("Failed to write to stdout")?;
    out.flush().context("Failed to flush stdout")?;
    Ok(())
}

async fn publish(config_path: PathBuf, fields: Vec<(String, String)>) -> Result<()> {
    let sink = load_config(&config_path)?
        .sink_config()
        .context("Invalid [sink] configuration")?;
    let mut dispatcher = PublishDispatcher::new(&sink).context("Failed to set up publisher")?;

    let outcome = if fields.is_empty() {
        publish_stdin(&dispatcher).await
    } else {
        let record: Record = fields.into_iter().collect();
        dispatcher
            .publish(&record)
            .await
            .with_context(|| format!("Failed to {} record", dispatcher.operation()))
    };

    dispatcher.destroy();
    outcome
}

async fn publish_stdin(dispatcher: &PublishDispatcher) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut published = 0usize;
    let mut failed = 0usize;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping line that is not a JSON object of strings");
                failed += 1;
                continue;
            }
        };

        // A failed record does not stop the ones after it
        match dispatcher.publish(&record).await {
            Ok(()) => published += 1,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Failed to publish record");
                failed += 1;
            }
        }
    }

    tracing::info!(published, failed, "Publishing finished");
    if failed > 0 {
        anyhow::bail!("{failed} of {} records could not be published", published + failed);
    }
    Ok(())
}
