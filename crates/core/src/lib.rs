pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, normalize_whitespace, split_windows, ChunkingConfig};
#[cfg(feature = "fastembed")]
pub use embeddings::MiniLmEmbedder;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use fingerprint::{folder_fingerprint, needs_rebuild, stored_fingerprint, update_fingerprint};
pub use ingest::{build_index, discover_pdf_files, document_chunks, document_name};
pub use models::{
    BuildReport, IndexStatus, IndexerOptions, MetadataLine, RetrieveQuery, RetrievedChunk,
    SkippedPdf, DEFAULT_TOP_K, RECONSTRUCTION_FAILED_TEXT,
};
pub use orchestrator::Retriever;
pub use store::{IndexHandle, IndexPaths, IndexSnapshot, RecordLog, VectorRecord};
pub use stores::FlatL2Index;
pub use traits::{Neighbor, VectorIndex};
