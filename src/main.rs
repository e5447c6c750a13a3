use clap::{Parser, Subcommand};
use rag_qa::Result;
use rag_qa::commands::{ask, chat, index, serve, show_status};
use rag_qa::config::{Config, DEFAULT_CONFIG_FILE, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-qa")]
#[command(about = "Question answering over a folder of PDF documents")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /ask over HTTP
    Serve,
    /// Chat with the assistant in the terminal
    Chat,
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
    },
    /// Load the vector index, building it from the PDFs if none is persisted
    Index {
        /// Ignore any persisted index and build a fresh one
        #[arg(long)]
        rebuild: bool,
    },
    /// Show corpus, index and language model status
    Status,
    /// Configure the language model connection
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&cli.config)?;
            } else {
                run_interactive_config(&cli.config)?;
            }
        }
        Commands::Serve => {
            serve(&Config::load(&cli.config)?).await?;
        }
        Commands::Chat => {
            chat(&Config::load(&cli.config)?).await?;
        }
        Commands::Ask { question } => {
            ask(&Config::load(&cli.config)?, &question).await?;
        }
        Commands::Index { rebuild } => {
            index(&Config::load(&cli.config)?, rebuild).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&cli.config)?).await?;
        }
    }

    Ok(())
}
