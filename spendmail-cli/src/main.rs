use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use spendmail_extract::{ClassifierClient, EmailInput, Extraction, OpenAiBackend, Pipeline};
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod state;
mod store;

use config::Config;
use store::JsonlStore;

#[derive(Parser, Debug)]
#[command(
    name = "spendmail",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SPENDMAIL_BUILD_SHA"), ")"),
    about = "Turn bank alert emails into spend records"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a transaction from one email body
    Extract {
        /// Sender email address
        #[arg(long)]
        sender: String,

        /// Mailbox message id (UID); makes the record id stable
        #[arg(long)]
        message_id: Option<String>,

        /// File holding the plain-text body (defaults to stdin)
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Process a JSONL feed of {source_message_id, sender_address, body}
    Batch {
        #[arg(long)]
        input: PathBuf,

        /// Transaction store (defaults to the configured store)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print stored transactions
    Export {
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },

    /// List issuers handled without the classifier
    Registry,

    /// Manage ~/.spendmail/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Extract {
            sender,
            message_id,
            body_file,
        } => {
            let body = match body_file {
                Some(p) => std::fs::read_to_string(&p)
                    .with_context(|| format!("read {}", p.display()))?,
                None => {
                    let mut s = String::new();
                    io::stdin().read_to_string(&mut s).context("read body from stdin")?;
                    s
                }
            };
            let cfg = config::load_config()?;
            let pipeline = build_pipeline(&cfg)?;

            let mut email = EmailInput::new(&body, &sender);
            if let Some(id) = message_id.as_deref() {
                email = email.with_message_id(id);
            }
            match pipeline.extract(&email)? {
                Extraction::Debit { transaction, path } => {
                    tracing::debug!(?path, "Extraction path");
                    println!("{}", serde_json::to_string_pretty(&transaction.to_item()?)?);
                }
                Extraction::NoTransaction(reason) => {
                    eprintln!("no transaction ({})", reason.label());
                }
            }
        }

        Command::Batch { input, store } => {
            let cfg = config::load_config()?;
            let pipeline = build_pipeline(&cfg)?;
            let store_path = match store {
                Some(p) => p,
                None => cfg.store_path()?,
            };
            let mut store = JsonlStore::open(&store_path)?;

            let f = std::fs::File::open(&input)
                .with_context(|| format!("open {}", input.display()))?;
            let summary = batch::run_batch(&pipeline, BufReader::new(f), &mut store)?;

            println!(
                "extracted={} duplicates={} no_transaction={} failed={} stored={} store={}",
                summary.extracted,
                summary.duplicates,
                summary.no_transaction,
                summary.failed,
                store.len(),
                store.path().display()
            );
            if summary.failed > 0 {
                bail!("{} email(s) failed; see log for details", summary.failed);
            }
        }

        Command::Export { store, format } => {
            let store_path = match store {
                Some(p) => p,
                None => config::load_config()?.store_path()?,
            };
            let records = JsonlStore::open(&store_path)?.records()?;
            match format {
                ExportFormat::Json => {
                    let items = records
                        .iter()
                        .map(|t| t.to_item())
                        .collect::<Result<Vec<_>, _>>()?;
                    println!("{}", serde_json::to_string_pretty(&items)?);
                }
                ExportFormat::Csv => {
                    let mut wtr = csv::Writer::from_writer(io::stdout());
                    for t in &records {
                        wtr.serialize(t)?;
                    }
                    wtr.flush()?;
                }
            }
        }

        Command::Registry => {
            let registry = config::load_config()?.registry()?;
            for issuer in registry.issuers() {
                println!(
                    "{:<28} {}  date={}",
                    issuer.domain, issuer.currency, issuer.date_format
                );
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                println!("# {}", config::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let registry = cfg.registry()?;
    let backend = OpenAiBackend::new(cfg.openai_config()?)?;
    tracing::debug!(model = backend.model(), issuers = registry.len(), "Pipeline ready");
    Ok(Pipeline::new(registry, ClassifierClient::new(Arc::new(backend))))
}
