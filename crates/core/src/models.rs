use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const MIN_CHUNK_CHARS: usize = 50;
pub const DEFAULT_TOP_K: usize = 5;
pub const CANDIDATE_MULTIPLIER: usize = 10;

/// Text returned for a hit whose chunk could not be recovered from its source document.
pub const RECONSTRUCTION_FAILED_TEXT: &str = "[Error extracting text]";

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
    pub dimensions: usize,
    pub candidate_multiplier: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            min_chunk_chars: MIN_CHUNK_CHARS,
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
            candidate_multiplier: CANDIDATE_MULTIPLIER,
        }
    }
}

/// Positional record describing which chunk produced the vector at the same
/// position in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataLine {
    pub document_name: String,
    pub chunk_id: String,
}

impl MetadataLine {
    pub fn new(document_name: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            document_name: document_name.into(),
            chunk_id: format!("chunk_{chunk_index}"),
        }
    }

    /// Splits on the last `|` so document names containing a pipe survive.
    pub fn parse(line: &str) -> Option<Self> {
        let (document_name, chunk_id) = line.trim().rsplit_once('|')?;
        if document_name.is_empty() || chunk_id.is_empty() {
            return None;
        }

        Some(Self {
            document_name: document_name.to_string(),
            chunk_id: chunk_id.to_string(),
        })
    }

    pub fn chunk_index(&self) -> Option<usize> {
        self.chunk_id.strip_prefix("chunk_")?.parse().ok()
    }

    pub fn matches_document(&self, wanted: &str) -> bool {
        self.document_name.trim().to_lowercase() == wanted.trim().to_lowercase()
    }
}

impl fmt::Display for MetadataLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.document_name, self.chunk_id)
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrieveQuery {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, alias = "active_pdf")]
    pub active_document: Option<String>,
}

impl RetrieveQuery {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            active_document: None,
        }
    }

    pub fn with_active_document(mut self, document: impl Into<String>) -> Self {
        self.active_document = Some(document.into());
        self
    }

    /// The document filter, if one is set to something other than blank text.
    pub fn document_filter(&self) -> Option<&str> {
        self.active_document
            .as_deref()
            .filter(|document| !document.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    #[serde(rename = "pdf_name")]
    pub document_name: String,
    pub chunk_id: String,
    /// Squared L2 distance; lower is closer.
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPdf>,
}

impl BuildReport {
    pub fn success(chunk_count: usize) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            chunk_count,
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub index_exists: bool,
    pub chunk_count: usize,
    pub metadata_count: usize,
}
