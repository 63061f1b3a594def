use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::ingest::document_chunks;
use crate::models::{
    IndexStatus, IndexerOptions, MetadataLine, RetrieveQuery, RetrievedChunk,
    RECONSTRUCTION_FAILED_TEXT,
};
use crate::store::IndexHandle;
use crate::traits::VectorIndex;
use crate::{IngestError, SearchError};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers similarity queries against the current index generation.
///
/// Chunk text is not persisted: each hit is re-derived by extracting and
/// chunking its source document again.
pub struct Retriever {
    handle: Arc<IndexHandle>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
    candidate_multiplier: usize,
}

impl Retriever {
    pub fn new(
        handle: Arc<IndexHandle>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn PdfExtractor>,
        options: &IndexerOptions,
    ) -> Result<Self, IngestError> {
        let chunking = ChunkingConfig::from(options);
        chunking.validate()?;

        Ok(Self {
            handle,
            embedder,
            extractor,
            chunking,
            candidate_multiplier: options.candidate_multiplier.max(1),
        })
    }

    pub fn handle(&self) -> &Arc<IndexHandle> {
        &self.handle
    }

    pub fn status(&self) -> IndexStatus {
        self.handle.status()
    }

    pub fn retrieve(&self, query: &RetrieveQuery) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.handle.snapshot();
        if snapshot.index.is_empty() {
            info!("retrieve against empty index");
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(&query.query)?;
        let candidates = query
            .top_k
            .saturating_mul(self.candidate_multiplier)
            .min(snapshot.index.len());
        let neighbors = snapshot.index.search(&query_vector, candidates)?;

        let filter = query.document_filter();
        let mut seen = HashSet::new();
        let mut documents = DocumentCache::new(self);
        let mut results = Vec::new();

        for neighbor in neighbors {
            let Some(raw) = snapshot.metadata.get(neighbor.position) else {
                continue;
            };
            let Some(line) = MetadataLine::parse(raw) else {
                warn!(position = neighbor.position, line = %raw, "malformed metadata line");
                continue;
            };

            if filter.is_some_and(|wanted| !line.matches_document(wanted)) {
                continue;
            }

            if !seen.insert(line.clone()) {
                continue;
            }

            let text = documents.chunk_text(&line);
            results.push(RetrievedChunk {
                document_name: line.document_name,
                chunk_id: line.chunk_id,
                score: neighbor.distance,
                text,
            });

            if results.len() >= query.top_k {
                break;
            }
        }

        info!(
            query = %query.query,
            active_document = ?filter,
            results = results.len(),
            "retrieve finished"
        );
        Ok(results)
    }

    fn document_path(&self, document_name: &str) -> PathBuf {
        self.handle.paths().documents_dir.join(document_name)
    }
}

/// Chunk sequences of documents already re-read during one retrieve call.
struct DocumentCache<'a> {
    retriever: &'a Retriever,
    chunks: HashMap<String, Result<Vec<String>, String>>,
}

impl<'a> DocumentCache<'a> {
    fn new(retriever: &'a Retriever) -> Self {
        Self {
            retriever,
            chunks: HashMap::new(),
        }
    }

    fn chunk_text(&mut self, line: &MetadataLine) -> String {
        let Some(chunk_index) = line.chunk_index() else {
            warn!(chunk_id = %line.chunk_id, "unparseable chunk id");
            return RECONSTRUCTION_FAILED_TEXT.to_string();
        };

        let retriever = self.retriever;
        let chunks = self
            .chunks
            .entry(line.document_name.clone())
            .or_insert_with(|| {
                let path = retriever.document_path(&line.document_name);
                document_chunks(retriever.extractor.as_ref(), &path, retriever.chunking)
                    .map_err(|error: IngestError| error.to_string())
            });

        match chunks {
            Ok(chunks) => chunks.get(chunk_index).cloned().unwrap_or_else(|| {
                debug!(
                    document = %line.document_name,
                    chunk_index,
                    available = chunks.len(),
                    "chunk index out of range, document changed since build"
                );
                RECONSTRUCTION_FAILED_TEXT.to_string()
            }),
            Err(error) => {
                warn!(document = %line.document_name, %error, "cannot re-read document");
                RECONSTRUCTION_FAILED_TEXT.to_string()
            }
        }
    }
}
