mod server;

use clap::{Parser, Subcommand, ValueEnum};
use pdf_retriever_core::{
    build_index, folder_fingerprint, needs_rebuild, stored_fingerprint, CharacterNgramEmbedder,
    Embedder, IndexHandle, IndexPaths, IndexerOptions, LopdfExtractor, PdfExtractor,
    RetrieveQuery, Retriever, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-retriever", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data directory containing staff_pdfs/ and config/
    #[arg(long, env = "INDEXER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Chunk window size in characters
    #[arg(long, default_value_t = pdf_retriever_core::models::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = pdf_retriever_core::models::DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::default())]
    embedder: EmbedderKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Hashed character trigrams, no model download.
    Ngram,
    /// all-MiniLM-L6-v2 sentence embeddings.
    #[cfg(feature = "fastembed")]
    Minilm,
}

impl Default for EmbedderKind {
    fn default() -> Self {
        #[cfg(feature = "fastembed")]
        {
            Self::Minilm
        }
        #[cfg(not(feature = "fastembed"))]
        {
            Self::Ngram
        }
    }
}

impl EmbedderKind {
    fn build(self) -> Arc<dyn Embedder> {
        match self {
            Self::Ngram => Arc::new(CharacterNgramEmbedder::default()),
            #[cfg(feature = "fastembed")]
            Self::Minilm => Arc::new(pdf_retriever_core::MiniLmEmbedder::new()),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from every PDF in the documents folder.
    Rebuild,
    /// Show whether an index exists and how many records it holds.
    Status,
    /// Return the chunks closest to a query.
    Retrieve {
        /// Query text
        #[arg(long)]
        query: String,
        /// Number of results; zero or negative returns nothing.
        #[arg(long, default_value_t = DEFAULT_TOP_K as i64, allow_negative_numbers = true)]
        top_k: i64,
        /// Only return chunks from this PDF (case-insensitive file name).
        #[arg(long, alias = "active-pdf")]
        active_document: Option<String>,
        /// Print the results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the current and stored document fingerprints.
    Fingerprint,
    /// Check that a PDF can be read and the embedder loads.
    Diagnose {
        /// PDF to open
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Serve rebuild, status and retrieve over HTTP.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8001")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let options = IndexerOptions {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        ..IndexerOptions::default()
    };
    let paths = IndexPaths::from_data_dir(&cli.data_dir);
    paths.ensure_dirs()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %cli.data_dir.display(),
        embedder = ?cli.embedder,
        "pdf-retriever boot"
    );

    let embedder = cli.embedder.build();
    let extractor: Arc<dyn PdfExtractor> = Arc::new(LopdfExtractor);

    match cli.command {
        Command::Rebuild => {
            let report = build_index(&paths, &options, extractor.as_ref(), embedder.as_ref())?;
            for skipped in &report.skipped {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status => {
            let handle = IndexHandle::open(paths, options.dimensions)?;
            println!("{}", serde_json::to_string_pretty(&handle.status())?);
        }
        Command::Retrieve {
            query,
            top_k,
            active_document,
            json,
        } => {
            let handle = Arc::new(IndexHandle::open(paths, options.dimensions)?);
            let retriever = Retriever::new(handle, embedder, extractor, &options)?;
            let request = RetrieveQuery {
                query,
                top_k: usize::try_from(top_k).unwrap_or(0),
                active_document,
            };

            let results = retriever.retrieve(&request)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "results": results }))?
                );
            } else {
                println!("query: {}", request.query);
                for hit in results {
                    println!(
                        "[{}] score={:.4} chunk={}",
                        hit.document_name, hit.score, hit.chunk_id
                    );
                    println!("  chunk_text:\n{}", hit.text);
                }
            }
        }
        Command::Fingerprint => {
            let current = folder_fingerprint(&paths.documents_dir);
            let stored = stored_fingerprint(&paths);
            println!("current: {current}");
            println!("stored: {}", stored.as_deref().unwrap_or("<none>"));
            println!("needs_rebuild: {}", needs_rebuild(&paths));
        }
        Command::Diagnose { pdf } => {
            println!("checking pdf {}", pdf.display());
            match extractor.extract_pages(&pdf) {
                Ok(pages) => {
                    println!("pdf loaded, pages with text: {}", pages.len());
                    match pages.first() {
                        Some(page) => println!(
                            "first text page: {}, text length: {}",
                            page.number,
                            page.text.chars().count()
                        ),
                        None => println!("no page yielded text"),
                    }
                }
                Err(error) => println!("error reading pdf: {error}"),
            }

            println!("checking embedder");
            match embedder.embed("test") {
                Ok(vector) => println!("embedder loaded, dimension: {}", vector.len()),
                Err(error) => println!("error loading embedder: {error}"),
            }
        }
        Command::Serve { bind } => {
            let handle = Arc::new(IndexHandle::open(paths, options.dimensions)?);
            let retriever = Arc::new(Retriever::new(
                handle,
                embedder.clone(),
                extractor.clone(),
                &options,
            )?);
            let state = server::AppState::new(options, embedder, extractor, retriever);
            server::run_server(&bind, state).await?;
        }
    }

    Ok(())
}
