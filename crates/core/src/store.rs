//! Persisted index artifacts and the shared, swappable view of them.
//!
//! The vector index and the metadata file are linked only by position: line
//! `i` of the metadata describes vector `i`. [`RecordLog`] is the only way the
//! builder produces both, so the two cannot drift apart within a build.

use crate::models::{IndexStatus, MetadataLine};
use crate::stores::FlatL2Index;
use crate::traits::VectorIndex;
use crate::SearchError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

pub const DOCUMENTS_DIR: &str = "staff_pdfs";
pub const CONFIG_DIR: &str = "config";
pub const INDEX_FILE: &str = "pdf_index.flat";
pub const METADATA_FILE: &str = "metadata.txt";
pub const FINGERPRINT_FILE: &str = "pdf_hash.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub documents_dir: PathBuf,
    pub config_dir: PathBuf,
    pub index_file: PathBuf,
    pub metadata_file: PathBuf,
    pub fingerprint_file: PathBuf,
}

impl IndexPaths {
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        let config_dir = data_dir.join(CONFIG_DIR);

        Self {
            documents_dir: data_dir.join(DOCUMENTS_DIR),
            index_file: config_dir.join(INDEX_FILE),
            metadata_file: config_dir.join(METADATA_FILE),
            fingerprint_file: config_dir.join(FINGERPRINT_FILE),
            config_dir,
        }
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.documents_dir)?;
        fs::create_dir_all(&self.config_dir)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: usize,
    pub vector: Vec<f32>,
    pub metadata: MetadataLine,
}

/// Append-only list of vectors and their metadata lines, in index order.
#[derive(Debug, Default)]
pub struct RecordLog {
    records: Vec<VectorRecord>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metadata: MetadataLine, vector: Vec<f32>) -> &VectorRecord {
        let id = self.records.len();
        self.records.push(VectorRecord {
            id,
            vector,
            metadata,
        });
        &self.records[id]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|record| record.vector.len())
    }

    pub fn into_parts(self) -> (Vec<Vec<f32>>, Vec<MetadataLine>) {
        self.records
            .into_iter()
            .map(|record| (record.vector, record.metadata))
            .unzip()
    }
}

pub fn write_metadata(path: &Path, lines: &[MetadataLine]) -> io::Result<()> {
    let mut contents = String::new();
    for line in lines {
        contents.push_str(&line.to_string());
        contents.push('\n');
    }
    fs::write(path, contents)
}

/// Metadata lines with surrounding whitespace trimmed; a missing file reads as empty.
pub fn read_metadata(path: &Path) -> io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.lines().map(|line| line.trim().to_string()).collect()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(error),
    }
}

/// One generation of the index and its metadata, loaded together.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub index: FlatL2Index,
    pub metadata: Vec<String>,
}

impl IndexSnapshot {
    /// Loads both artifacts; a missing index file gives an empty index of `dimension`.
    pub fn load(paths: &IndexPaths, dimension: usize) -> Result<Self, SearchError> {
        let index = if paths.index_file.exists() {
            FlatL2Index::load(&paths.index_file)?
        } else {
            info!(path = %paths.index_file.display(), "index file not found, using empty index");
            FlatL2Index::new(dimension)
        };
        let metadata = read_metadata(&paths.metadata_file)?;

        info!(
            index_size = index.len(),
            metadata_size = metadata.len(),
            "index resources loaded"
        );

        Ok(Self { index, metadata })
    }
}

/// Process-wide handle on the current [`IndexSnapshot`].
///
/// Readers take an `Arc` to one snapshot and keep it for the whole call, so a
/// reload never shows them a new index next to old metadata.
#[derive(Debug)]
pub struct IndexHandle {
    paths: IndexPaths,
    dimension: usize,
    current: RwLock<Arc<IndexSnapshot>>,
}

impl IndexHandle {
    pub fn new(paths: IndexPaths, dimension: usize, snapshot: IndexSnapshot) -> Self {
        Self {
            paths,
            dimension,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn open(paths: IndexPaths, dimension: usize) -> Result<Self, SearchError> {
        let snapshot = IndexSnapshot::load(&paths, dimension)?;
        Ok(Self::new(paths, dimension, snapshot))
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, snapshot: IndexSnapshot) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(snapshot);
    }

    /// Re-reads the artifacts from disk and swaps them in as one unit.
    pub fn reload(&self) -> Result<(), SearchError> {
        let snapshot = IndexSnapshot::load(&self.paths, self.dimension)?;
        self.replace(snapshot);
        Ok(())
    }

    pub fn status(&self) -> IndexStatus {
        let snapshot = self.snapshot();
        IndexStatus {
            index_exists: self.paths.index_file.exists(),
            chunk_count: snapshot.index.len(),
            metadata_count: snapshot.metadata.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_follow_data_dir_layout() {
        let paths = IndexPaths::from_data_dir("data");
        assert_eq!(paths.documents_dir, Path::new("data/staff_pdfs"));
        assert_eq!(paths.index_file, Path::new("data/config/pdf_index.flat"));
        assert_eq!(paths.metadata_file, Path::new("data/config/metadata.txt"));
        assert_eq!(paths.fingerprint_file, Path::new("data/config/pdf_hash.txt"));
    }

    #[test]
    fn record_log_keeps_vectors_and_lines_aligned() {
        let mut log = RecordLog::new();
        assert_eq!(log.push(MetadataLine::new("a.pdf", 0), vec![1.0]).id, 0);
        assert_eq!(log.push(MetadataLine::new("a.pdf", 1), vec![2.0]).id, 1);
        log.push(MetadataLine::new("b.pdf", 0), vec![3.0]);

        assert_eq!(log.dimension(), Some(1));
        let (vectors, lines) = log.into_parts();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(lines[2].to_string(), "b.pdf|chunk_0");
    }

    #[test]
    fn missing_artifacts_load_as_empty_state() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = IndexPaths::from_data_dir(dir.path());

        let handle = IndexHandle::open(paths, 384)?;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.index.len(), 0);
        assert_eq!(snapshot.index.dimension(), 384);
        assert!(snapshot.metadata.is_empty());
        assert_eq!(
            handle.status(),
            IndexStatus {
                index_exists: false,
                chunk_count: 0,
                metadata_count: 0,
            }
        );
        Ok(())
    }

    #[test]
    fn reload_swaps_whole_snapshot() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = IndexPaths::from_data_dir(dir.path());
        paths.ensure_dirs()?;
        let handle = IndexHandle::open(paths.clone(), 2)?;
        let before = handle.snapshot();

        let mut index = FlatL2Index::new(2);
        index.add(&[vec![1.0, 1.0]])?;
        index.save(&paths.index_file)?;
        write_metadata(&paths.metadata_file, &[MetadataLine::new("a.pdf", 0)])?;
        handle.reload()?;

        assert_eq!(before.index.len(), 0);
        let after = handle.snapshot();
        assert_eq!(after.index.len(), 1);
        assert_eq!(after.metadata, vec!["a.pdf|chunk_0".to_string()]);
        assert!(handle.status().index_exists);
        Ok(())
    }

    #[test]
    fn metadata_lines_are_trimmed_on_read() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("metadata.txt");
        fs::write(&path, "a.pdf|chunk_0\r\n b.pdf|chunk_1 \n")?;
        assert_eq!(read_metadata(&path)?, vec!["a.pdf|chunk_0", "b.pdf|chunk_1"]);
        Ok(())
    }
}
