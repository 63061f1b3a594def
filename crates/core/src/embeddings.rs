use crate::error::SearchError;

/// Output width of all-MiniLM-L6-v2, and of the offline embedder by default.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Embeds every text in one call; output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Hashed character-trigram embedder. Deterministic and needs no model files.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    const GRAM: usize = 3;

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let chars: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
        if chars.is_empty() {
            return vector;
        }

        // Texts shorter than a gram still hash as one feature.
        let width = Self::GRAM.min(chars.len());
        for gram in chars.windows(width) {
            let hash = fnv1a(gram);
            let bucket = (hash % vector.len() as u64) as usize;
            // High bit picks the sign.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut buffer = [0u8; 4];
    chars.iter().fold(0xcbf2_9ce4_8422_2325, |hash, ch| {
        ch.encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3))
    })
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(feature = "fastembed")]
pub use minilm::MiniLmEmbedder;

#[cfg(feature = "fastembed")]
mod minilm {
    use super::{Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
    use crate::error::SearchError;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;
    use tracing::info;

    /// all-MiniLM-L6-v2 sentence embeddings through fastembed.
    ///
    /// The model is loaded on the first call and kept for the lifetime of the value.
    #[derive(Default)]
    pub struct MiniLmEmbedder {
        model: Mutex<Option<TextEmbedding>>,
    }

    impl MiniLmEmbedder {
        pub fn new() -> Self {
            Self::default()
        }

        fn load() -> Result<TextEmbedding, SearchError> {
            info!(model = "all-MiniLM-L6-v2", "loading sentence embedding model");
            TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
            )
            .map_err(|error| SearchError::Embedding(format!("model load failed: {error}")))
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn dimensions(&self) -> usize {
            DEFAULT_EMBEDDING_DIMENSIONS
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let mut guard = self
                .model
                .lock()
                .map_err(|_| SearchError::Embedding("embedding model lock poisoned".to_string()))?;

            if guard.is_none() {
                *guard = Some(Self::load()?);
            }

            let Some(model) = guard.as_mut() else {
                return Err(SearchError::Embedding("embedding model unavailable".to_string()));
            };

            model
                .embed(texts.to_vec(), None)
                .map_err(|error| SearchError::Embedding(error.to_string()))
        }
    }
}
