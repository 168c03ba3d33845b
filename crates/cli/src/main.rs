//! `recall` - inspect working memory and run memory-augmented chat turns.
//!
//! ## Commands
//!
//! - `history`: print a session's working memory
//! - `clear`: delete a session's working memory
//! - `augment`: print the context-augmented prompt for a message
//! - `chat`: answer one message with working memory and retrieval
//!
//! # Environment Variables
//!
//! - `RECALL_CONFIG` - path to the TOML config file
//! - `RECALL_MEMORY_SERVER_URL` - memory server base URL (overrides the config)
//! - `OPENAI_API_KEY` - API key for the openai provider

mod turn;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use recall_llm::build_llm_client;
use recall_memory::{ChatMemoryStore, WorkingMemoryChat};
use recall_rag::{Query, RecallConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recall")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Working memory and long-term retrieval for chat agents", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Memory server base URL
    #[arg(long, global = true, env = "RECALL_MEMORY_SERVER_URL")]
    memory_server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the turns held in a session's working memory
    History {
        /// Session identifier
        #[arg(short, long)]
        session: String,
    },

    /// Delete a session's working memory
    Clear {
        /// Session identifier
        #[arg(short, long)]
        session: String,
    },

    /// Print the prompt that retrieval would send for a message
    Augment {
        /// User whose memories are searched
        #[arg(short, long)]
        user: String,

        /// Session whose history informs query compression
        #[arg(short, long)]
        session: Option<String>,

        /// The user's message
        message: String,
    },

    /// Answer one message using working memory and retrieval
    Chat {
        /// User whose memories are searched
        #[arg(short, long)]
        user: String,

        /// Session to continue (a new one is started if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// System prompt for the answering model
        #[arg(long, default_value = turn::DEFAULT_SYSTEM_PROMPT)]
        system: String,

        /// The user's message
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,recall=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match cli.config {
        Some(ref path) => RecallConfig::from_file(path)?,
        None => RecallConfig::default(),
    };
    if let Some(url) = cli.memory_server {
        config.memory_server.base_url = Some(url);
    }

    match cli.command {
        Commands::History { session } => {
            let store: Arc<dyn ChatMemoryStore> = Arc::new(config.working_memory_store()?);
            let chat = WorkingMemoryChat::load_strict(session, store)
                .await
                .context("Failed to read working memory")?;
            if chat.read().is_empty() {
                println!("(no turns in session '{}')", chat.id());
            }
            for turn in chat.read() {
                println!("{}: {}", turn.role, turn.text);
            }
        }

        Commands::Clear { session } => {
            let store = config.working_memory_store()?;
            store
                .delete(&session)
                .await
                .context("Failed to clear working memory")?;
            println!("Cleared session '{session}'");
        }

        Commands::Augment {
            user,
            session,
            message,
        } => {
            let llm = build_llm_client(&config.llm)?;
            let augmentor = config.build_augmentor(llm)?;

            let mut query = Query::new(&message, user);
            if let Some(session) = session {
                let store: Arc<dyn ChatMemoryStore> = Arc::new(config.working_memory_store()?);
                let chat = WorkingMemoryChat::load(session, store).await;
                query = query.with_history(chat.read().to_vec());
            }

            let result = augmentor.augment(&query, &message).await?;
            println!("{}", result.prompt);
        }

        Commands::Chat {
            user,
            session,
            system,
            message,
        } => {
            let llm = build_llm_client(&config.llm)?;
            let augmentor = config.build_augmentor(llm.clone())?;
            let store: Arc<dyn ChatMemoryStore> = Arc::new(config.working_memory_store()?);

            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            info!(session_id = %session, user_id = %user, "Starting chat turn");
            let mut chat = WorkingMemoryChat::load(session, store).await;

            let answer =
                turn::run_turn(&mut chat, &augmentor, llm.as_ref(), &user, &system, &message)
                    .await?;
            println!("{answer}");
            eprintln!("session: {}", chat.id());
        }
    }

    Ok(())
}
