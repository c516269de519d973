use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use sms_ledger::config;
use sms_ledger::db::{self, SqliteStore};
use sms_ledger::manual::{ManualExpense, RecordEdit};
use sms_ledger::model::format_timestamp;
use sms_ledger::source::{JsonInboxSource, LineSource};
use sms_ledger::summary::Summary;
use sms_ledger::{BatchPipeline, Ingestor, LiveListener, TransactionStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "Track bank SMS transactions and manual expenses")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import unseen bank messages from an inbox export (JSON array)
    Ingest {
        #[arg(long)]
        inbox: PathBuf,
    },
    /// Ingest newline-delimited JSON messages from stdin as they arrive
    Listen,
    /// List stored transactions, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Record a manual expense
    Add {
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: Decimal,
        /// RFC 3339 timestamp or YYYY-MM-DD; defaults to now
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Change fields of a stored transaction
    Update {
        id: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a stored transaction
    Delete { id: i64 },
    /// Balance, this month's expenses and spending by category
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Print an example configuration file
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::PrintConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load_or_default(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.default_database_url());
    let store = SqliteStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open {}", database_url))?;
    info!(database_url = %database_url, "ledger opened");

    let ingestor = Ingestor::new(Arc::new(store.clone()))
        .with_category(cfg.ingest.default_category.clone());

    match args.command {
        Command::Ingest { inbox } => {
            let pipeline = BatchPipeline::new(ingestor, cfg.sender_classifier())
                .with_concurrency(cfg.ingest.concurrency);
            let report = pipeline
                .run_with_report(&JsonInboxSource::new(inbox))
                .await?;
            println!(
                "fetched {}, new bank transactions {}, saved {}, duplicates {}",
                report.fetched,
                report.candidates.len(),
                report.persisted,
                report.duplicates
            );
        }
        Command::Listen => {
            let source = Arc::new(LineSource::new(tokio::io::BufReader::new(tokio::io::stdin())));
            let listener = LiveListener::new(ingestor, source)
                .with_policy(cfg.live_policy())
                .with_sender_filter(cfg.live_sender_filter());
            listener.start().await?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {
                        if !listener.is_running().await {
                            break;
                        }
                    }
                }
            }
            listener.stop().await;
            let counts = listener.counts();
            println!(
                "received {}, saved {}, duplicates {}, ignored {}, failed {}",
                counts.received,
                counts.persisted,
                counts.duplicates,
                counts.invalid + counts.filtered,
                counts.failed
            );
        }
        Command::List { json } => {
            let records = store.list_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{:>5}  {}  {:<6} {:>12}  {:<12} {:<6} {}",
                        r.id,
                        format_timestamp(&r.occurred_at),
                        r.kind.as_str(),
                        r.amount,
                        r.category,
                        r.origin.as_str(),
                        r.notes.replace('\n', " ")
                    );
                }
            }
        }
        Command::Add {
            category,
            amount,
            date,
            notes,
        } => {
            let occurred_at = match date {
                Some(d) => parse_date(&d)?,
                None => Utc::now(),
            };
            let record = ManualExpense {
                category,
                amount,
                occurred_at,
                notes,
            }
            .into_record()?;
            let id = store.insert(&record).await?;
            println!("saved expense {}", id);
        }
        Command::Update {
            id,
            category,
            amount,
            date,
            notes,
        } => {
            let existing = db::fetch_transaction(store.pool(), id)
                .await?
                .ok_or_else(|| anyhow!("no transaction with id {}", id))?;
            let occurred_at = match date {
                Some(d) => Some(parse_date(&d)?),
                None => None,
            };
            let record = RecordEdit {
                category,
                amount,
                occurred_at,
                notes,
            }
            .apply(&existing)?;
            store.update(id, &record).await?;
            println!("updated {}", id);
        }
        Command::Delete { id } => {
            if !store.delete(id).await? {
                bail!("no transaction with id {}", id);
            }
            println!("deleted {}", id);
        }
        Command::Summary { json } => {
            let records = store.list_all().await?;
            let summary = Summary::compute(&records, Utc::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Total balance     {}", summary.balance);
                println!("Monthly expenses  {}", summary.monthly_expenses);
                for share in &summary.by_category {
                    println!("  {:<14} {:>12}  {:>5}%", share.category, share.amount, share.percent);
                }
            }
        }
        Command::PrintConfig => unreachable!("handled before the store is opened"),
    }

    Ok(())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {:?}", raw))?;
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("invalid date {:?}", raw))
}
