//! # Consult Harness CLI (`consult`)
//!
//! The `consult` binary runs the HTTP server and exposes every pipeline
//! operation as a command, printing the same JSON bodies the server returns.
//!
//! ## Usage
//!
//! ```bash
//! consult --config ./config/consult.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `consult serve` | Start the HTTP server |
//! | `consult init` | Ensure the document collection exists |
//! | `consult ingest --prompt "<text>"` | Normalize and store a submission from local files |
//! | `consult search "<query>"` | Semantic search |
//! | `consult rag "<query>"` | Retrieval-augmented answer |
//! | `consult agent "<query>"` | Ask the hosted query agent |
//! | `consult call --prompt "<text>" --phone <number>` | Voice-call handoff |
//! | `consult setup assistant` | Create the advisor assistant and a phone number |
//! | `consult setup existing` | Provision a number for an existing assistant |
//! | `consult check-keys` | Probe the configured Vapi keys |
//!
//! Secrets (`GEMINI_API_KEY`, `WEAVIATE_URL`, `WEAVIATE_API_KEY`,
//! `VAPI_API_KEY`, `VAPI_ASSISTANT_ID`, `VAPI_PHONE_NUMBER_ID`) are read from
//! the environment, then from the env file named in the config.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use consult_harness::config::{self, Config};
use consult_harness::ingest::{self, FilePart, FormSubmission};
use consult_harness::models::Status;
use consult_harness::search::{self, Envelope, DEFAULT_RAG_LIMIT, DEFAULT_SEARCH_LIMIT};
use consult_harness::server::{self, AppState};
use consult_harness::{setup, voice};

/// Consult Harness CLI: intake normalization, document retrieval, and
/// voice-call handoff over hosted AI services.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "consult",
    about = "Consult Harness: normalize, store, retrieve, and hand consultations to a voice agent",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/consult.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ensure the document collection exists. Safe to run repeatedly.
    Init,

    /// Run the ingestion pipeline on local files.
    Ingest {
        /// Consultation prompt text.
        #[arg(long)]
        prompt: String,

        /// PDF attachment (repeatable).
        #[arg(long = "pdf")]
        pdfs: Vec<PathBuf>,

        /// Image attachment (repeatable).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Semantic search over stored documents.
    Search {
        query: String,

        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Retrieval-augmented answer.
    Rag {
        query: String,

        #[arg(long, default_value_t = DEFAULT_RAG_LIMIT)]
        limit: usize,
    },

    /// Ask the hosted query agent.
    Agent { query: String },

    /// Generate a focused query, retrieve context, and place a call.
    Call {
        #[arg(long)]
        prompt: String,

        /// Customer number in E.164 form.
        #[arg(long)]
        phone: Option<String>,
    },

    /// One-time voice setup.
    Setup {
        #[command(subcommand)]
        action: SetupAction,
    },

    /// Probe each configured Vapi key.
    CheckKeys,
}

#[derive(Subcommand)]
enum SetupAction {
    /// Create the advisor assistant and a phone number.
    Assistant {
        #[arg(long, default_value = "415")]
        area_code: String,
    },
    /// Provision a phone number for the first existing assistant.
    Existing {
        #[arg(long, default_value = "689")]
        area_code: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Init => {
            run_init(&cfg).await?;
        }
        Commands::Ingest {
            prompt,
            pdfs,
            images,
        } => {
            let form = FormSubmission {
                prompt,
                phone_number: None,
                pdfs: read_parts(&pdfs)?,
                images: read_parts(&images)?,
            };
            let state = AppState::from_config(&cfg);
            let response = ingest::process_form(
                state.generator.as_ref(),
                state.store.as_ref(),
                &cfg.uploads.root,
                form,
            )
            .await;
            print_json(&response)?;
            if response.status == Status::Error {
                bail!("ingestion failed");
            }
        }
        Commands::Search { query, limit } => {
            let state = AppState::from_config(&cfg);
            print_envelope(&search::search_documents(state.store.as_ref(), &query, limit).await)?;
        }
        Commands::Rag { query, limit } => {
            let state = AppState::from_config(&cfg);
            print_envelope(&search::generate_response(state.store.as_ref(), &query, limit).await)?;
        }
        Commands::Agent { query } => {
            let state = AppState::from_config(&cfg);
            print_envelope(&search::query_with_agent(state.store.as_ref(), &query).await)?;
        }
        Commands::Call { prompt, phone } => {
            let state = AppState::from_config(&cfg);
            let envelope = voice::run_handoff(
                &cfg,
                state.generator.as_ref(),
                state.store.as_ref(),
                state.voice.as_ref(),
                &prompt,
                phone.as_deref(),
            )
            .await;
            print_envelope(&envelope)?;
        }
        Commands::Setup { action } => match action {
            SetupAction::Assistant { area_code } => {
                setup::run_setup_assistant(&cfg, &area_code).await?;
            }
            SetupAction::Existing { area_code } => {
                setup::run_setup_existing(&cfg, &area_code).await?;
            }
        },
        Commands::CheckKeys => {
            setup::run_check_keys(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(cfg);
    let session = state
        .store
        .connect()
        .await
        .context("Failed to connect to Weaviate")?;
    let collection = session.collection().to_string();
    let result = session.create_collection().await;
    session.close().await;

    if result.context("Failed to create collection")? {
        println!("Created collection {}.", collection);
    } else {
        println!("Collection {} already exists.", collection);
    }
    Ok(())
}

fn read_parts(paths: &[PathBuf]) -> anyhow::Result<Vec<FilePart>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(FilePart {
                filename: file_name(path),
                bytes,
            })
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the envelope; an error envelope also fails the command.
fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<()> {
    print_json(envelope)?;
    if !envelope.is_ok() {
        bail!("request failed");
    }
    Ok(())
}
