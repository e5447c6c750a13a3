use anyhow::{Context, Result};
use tracing::{error, info};

use crate::QaError;
use crate::config::Config;
use crate::database::IndexManifest;
use crate::indexer::SharedIndex;
use crate::pipeline::QaService;

/// Serve the HTTP endpoint until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    info!("Starting server on {}", config.bind_address());
    crate::server::serve(config)
        .await
        .context("HTTP server failed")
}

/// Start the interactive terminal chat
#[inline]
pub async fn chat(config: &Config) -> Result<()> {
    crate::chat::run_chat(config).await
}

/// Answer one question and print the answer to stdout
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let service = QaService::from_config(config).context("Failed to initialise the QA pipeline")?;

    match service.ask(question).await {
        Ok(answer) => {
            println!("{}", answer.text);
            info!("Answer grounded on {} chunks", answer.sources.len());
            Ok(())
        }
        Err(e) => {
            error!("Failed to answer question: {}", e);
            Err(e).context("Failed to answer question")
        }
    }
}

/// Load the persisted index, building it first if needed
#[inline]
pub async fn index(config: &Config, rebuild: bool) -> Result<()> {
    let mut shared = SharedIndex::from_config(config);

    let index = if rebuild {
        println!(
            "Rebuilding index from {}",
            config.corpus.dataset_dir.display()
        );
        shared.rebuild().await.context("Failed to rebuild index")?
    } else {
        shared.get().await.context("Failed to load or build index")?
    };

    if shared.build_count() > 0 {
        println!(
            "✅ Built index with {} chunks at {}",
            index.len(),
            shared.location().display()
        );
    } else {
        println!(
            "✅ Loaded index with {} chunks from {}",
            index.len(),
            shared.location().display()
        );
    }

    Ok(())
}

/// Show whether a persisted index exists and what it contains
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 RAG QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("📚 Corpus:");
    let dataset_dir = config.corpus.dataset_dir.clone();
    let listing =
        tokio::task::spawn_blocking(move || crate::documents::list_pdf_files(&dataset_dir))
            .await
            .context("PDF listing task failed")?;
    match listing {
        Ok(files) => {
            println!(
                "   ✅ {} PDF files in {}",
                files.len(),
                config.corpus.dataset_dir.display()
            );
        }
        Err(e) => println!("   ❌ {}", e),
    }

    println!("🔍 Vector Index:");
    match IndexManifest::read(&config.index.path).await {
        Ok(manifest) => {
            println!("   ✅ Index: {}", config.index.path.display());
            println!("   📋 Model: {}", manifest.model_id);
            println!("   🔢 Dimension: {}", manifest.dimension);
            println!("   🧩 Chunks: {}", manifest.count);
            println!(
                "   🕒 Built: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Err(QaError::IndexNotFound { path }) => {
            println!(
                "   ⚠️  No index at {}; it will be built on first use",
                path.display()
            );
        }
        Err(e) => println!("   ❌ Index unreadable: {}", e),
    }

    println!("🤖 Language Model:");
    println!("   Endpoint: {}", config.llm.base_url);
    println!("   Model: {}", config.llm.model);
    if config.llm.resolve_api_key().is_some() {
        println!("   ✅ API key configured");
    } else {
        println!("   ❌ No API key in ${}", config.llm.api_key_env);
    }

    Ok(())
}
