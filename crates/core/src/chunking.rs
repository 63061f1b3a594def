use crate::error::IngestError;
use crate::models::IndexerOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chars: usize,
}

impl From<&IndexerOptions> for ChunkingConfig {
    fn from(value: &IndexerOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
            min_chars: value.min_chunk_chars,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IndexerOptions::default())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    /// Distance in characters between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Collapses every whitespace run to one space, drops NUL characters and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\0', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed-size character windows over `text`, before any length filtering.
///
/// Windows start every `step()` characters; the last window is the first one
/// that reaches the end of the text, so it may be shorter than `chunk_size`.
pub fn split_windows(text: &str, config: ChunkingConfig) -> Result<Vec<&str>, IngestError> {
    config.validate()?;

    let offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    let total = offsets.len();
    let byte_at = |position: usize| offsets.get(position).copied().unwrap_or(text.len());

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + config.chunk_size).min(total);
        windows.push(&text[byte_at(start)..byte_at(end)]);
        if end == total {
            break;
        }
        start += config.step();
    }

    Ok(windows)
}

/// Splits normalized text into overlapping chunks, keeping only windows whose
/// trimmed length exceeds `min_chars`.
///
/// The position of a chunk in the returned vector is its chunk index.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    let chunks = split_windows(text, config)?
        .into_iter()
        .filter(|window| window.trim().chars().count() > config.min_chars)
        .map(str::to_string)
        .collect();

    Ok(chunks)
}
