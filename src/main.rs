use anyhow::{Context, Result};
use clap::Parser;
use invitrack::cli::{Cli, Command, LedgerCommand, OutputFormat, RunArgs};
use invitrack::config::Config;
use invitrack::dispatch::Dispatcher;
use invitrack::ledger::{JsonFileLedger, LedgerStore};
use invitrack::notice::{JoinNotice, NoticeTemplates};
use invitrack::snapshot_store::MemorySnapshotStore;
use invitrack::source::ReplaySource;
use invitrack::tracker::{InviteTracker, TrackerConfig};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; logs go to stderr so stdout carries notices
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (if any) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    if let Some(ledger) = &cli.ledger {
        config.ledger_path = ledger.clone();
    }
    if let Command::Run(RunArgs {
        fetch_timeout_ms: Some(ms),
        ..
    }) = &cli.command
    {
        config.fetch_timeout_ms = *ms;
    }

    config.validate()?;
    Ok(config)
}

/// Write each notice to stdout as it arrives
async fn print_notices(
    mut notices: mpsc::UnboundedReceiver<JoinNotice>,
    format: OutputFormat,
    templates: NoticeTemplates,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(notice) = notices.recv().await {
        let mut line = match format {
            OutputFormat::Text => notice.render(&templates),
            OutputFormat::Json => notice.to_json()?,
        };
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn run_events(config: Config, args: RunArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(process_events(config, args))
}

async fn process_events(config: Config, args: RunArgs) -> Result<()> {
    let replay = Arc::new(ReplaySource::new());
    let tracker = Arc::new(
        InviteTracker::new(
            replay.clone(),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(JsonFileLedger::new(&config.ledger_path)),
            TrackerConfig::default().with_fetch_timeout(config.fetch_timeout()),
        )
        .with_context(|| format!("Failed to load ledger {}", config.ledger_path.display()))?,
    );

    let (notices, received) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_notices(received, args.format, config.notice.clone()));
    let dispatcher = Dispatcher::new(Arc::clone(&tracker), replay, notices);

    let stats = match &args.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event log {}", path.display()))?;
            dispatcher.run(BufReader::new(file)).await?
        }
        None => dispatcher.run(BufReader::new(tokio::io::stdin())).await?,
    };

    printer.await.context("Notice printer task failed")??;

    let ledger = tracker.ledger().await;
    tracing::info!(
        events = stats.events,
        malformed = stats.malformed,
        inviters = ledger.len(),
        attributed = ledger.total(),
        "Event log processed"
    );
    Ok(())
}

fn run_ledger(config: &Config, command: LedgerCommand) -> Result<()> {
    let store = JsonFileLedger::new(&config.ledger_path);
    let ledger = store
        .load()
        .with_context(|| format!("Failed to load ledger {}", store.path().display()))?;

    match command {
        LedgerCommand::Show { top, format } => {
            let ranked = ledger.ranked(top);
            match format {
                OutputFormat::Text => {
                    if ranked.is_empty() {
                        println!("No attributed joins recorded");
                    }
                    for (inviter, count) in ranked {
                        println!("{:>6}  {}", count, inviter);
                    }
                }
                OutputFormat::Json => {
                    for (inviter, count) in ranked {
                        println!("{}", serde_json::json!({ "inviter": inviter, "count": count }));
                    }
                }
            }
        }
        LedgerCommand::Get { inviter } => {
            println!("{}", ledger.get(&inviter));
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let config = load_config(&cli)?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Command::Run(args) => run_events(config, args),
        Command::Ledger { command } => run_ledger(&config, command),
    }
}
