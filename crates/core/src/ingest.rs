use crate::chunking::{chunk_text, normalize_whitespace, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::fingerprint::update_fingerprint;
use crate::models::{BuildReport, IndexerOptions, MetadataLine, SkippedPdf};
use crate::store::{write_metadata, IndexPaths, RecordLog};
use crate::stores::FlatL2Index;
use crate::traits::VectorIndex;
use crate::IngestError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// PDF files directly inside `folder`, in directory-listing order.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files
}

pub fn document_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Extract, normalize and chunk one document.
///
/// The retriever calls this too, to recover chunk text from a metadata line.
pub fn document_chunks(
    extractor: &dyn PdfExtractor,
    path: &Path,
    config: ChunkingConfig,
) -> Result<Vec<String>, IngestError> {
    let raw = extractor.extract_text(path)?;
    chunk_text(&normalize_whitespace(&raw), config)
}

/// Rebuilds the index, metadata and fingerprint from every PDF in the documents folder.
///
/// A document that cannot be read or embedded is skipped and listed in the
/// report; only failures writing the artifacts abort the build.
pub fn build_index(
    paths: &IndexPaths,
    options: &IndexerOptions,
    extractor: &dyn PdfExtractor,
    embedder: &dyn Embedder,
) -> Result<BuildReport, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;
    paths.ensure_dirs()?;

    info!(folder = %paths.documents_dir.display(), "starting index build");
    let files = discover_pdf_files(&paths.documents_dir);

    if files.is_empty() {
        warn!(folder = %paths.documents_dir.display(), "no pdf files found");
        FlatL2Index::new(options.dimensions).save(&paths.index_file)?;
        write_metadata(&paths.metadata_file, &[])?;
        update_fingerprint(paths)?;

        let mut report = BuildReport::success(0);
        report.message = Some("No PDFs found. Empty index created.".to_string());
        return Ok(report);
    }

    let mut records = RecordLog::new();
    let mut skipped = Vec::new();

    for path in files {
        let embedded = (|| {
            let name = document_name(&path)?;
            let chunks = document_chunks(extractor, &path, config)?;
            if chunks.is_empty() {
                return Ok::<_, IngestError>((name, Vec::new()));
            }

            let vectors = embedder.embed_batch(&chunks)?;
            if vectors.len() != chunks.len() {
                return Err(IngestError::InvalidArgument(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                )));
            }

            let expected = records.dimension().unwrap_or(vectors[0].len());
            if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
                return Err(IngestError::InvalidArgument(format!(
                    "embedding dimension {} differs from {expected}",
                    bad.len()
                )));
            }

            Ok((name, vectors))
        })();

        match embedded {
            Ok((name, vectors)) if vectors.is_empty() => {
                debug!(document = %name, "no chunks long enough to index");
            }
            Ok((name, vectors)) => {
                debug!(document = %name, chunks = vectors.len(), "document embedded");
                for (chunk_index, vector) in vectors.into_iter().enumerate() {
                    records.push(MetadataLine::new(name.as_str(), chunk_index), vector);
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping pdf");
                skipped.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    if records.is_empty() {
        warn!("no chunks produced, writing empty index");
    }
    let chunk_count = records.len();
    let dimension = records.dimension().unwrap_or(options.dimensions);
    let (vectors, lines) = records.into_parts();

    let mut index = FlatL2Index::new(dimension);
    index.add(&vectors)?;
    index.save(&paths.index_file)?;
    write_metadata(&paths.metadata_file, &lines)?;
    update_fingerprint(paths)?;

    info!(
        chunk_count,
        skipped = skipped.len(),
        index = %paths.index_file.display(),
        "index built"
    );

    let mut report = BuildReport::success(chunk_count);
    report.skipped = skipped;
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::{LopdfExtractor, PageText};
    use crate::fingerprint::{folder_fingerprint, stored_fingerprint};
    use crate::store::{read_metadata, IndexSnapshot};
    use crate::SearchError;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    /// Serves fixed text per file name; unknown files fail like a corrupt PDF.
    #[derive(Default)]
    pub(crate) struct FakeExtractor {
        pub(crate) texts: HashMap<String, String>,
    }

    impl FakeExtractor {
        pub(crate) fn with(mut self, name: &str, text: impl Into<String>) -> Self {
            self.texts.insert(name.to_string(), text.into());
            self
        }
    }

    impl PdfExtractor for FakeExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let name = document_name(path)?;
            self.texts
                .get(&name)
                .map(|text| {
                    vec![PageText {
                        number: 1,
                        text: text.clone(),
                    }]
                })
                .ok_or_else(|| IngestError::PdfParse(format!("cannot parse {name}")))
        }
    }

    /// Fails for any batch containing `poison`.
    struct PoisonedEmbedder {
        inner: CharacterNgramEmbedder,
        poison: &'static str,
    }

    impl Embedder for PoisonedEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            if texts.iter().any(|text| text.contains(self.poison)) {
                return Err(SearchError::Embedding("model crashed".to_string()));
            }
            self.inner.embed_batch(texts)
        }
    }

    fn workspace() -> Result<(tempfile::TempDir, IndexPaths), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = IndexPaths::from_data_dir(dir.path());
        paths.ensure_dirs()?;
        Ok((dir, paths))
    }

    fn touch(paths: &IndexPaths, name: &str) -> Result<(), std::io::Error> {
        fs::write(paths.documents_dir.join(name), b"%PDF-1.4\n%placeholder")
    }

    /// Non-repeating filler so that no two windows embed identically.
    pub(crate) fn text_of_len(len: usize) -> String {
        let mut text = String::new();
        let mut word = 0;
        while text.len() < len {
            text.push_str(&format!("term{word} "));
            word += 1;
        }
        text.truncate(len);
        text
    }

    #[test]
    fn discovery_is_flat_and_case_insensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("a.pdf"), b"")?;
        fs::write(dir.path().join("B.PDF"), b"")?;
        fs::write(dir.path().join("c.txt"), b"")?;
        fs::write(nested.join("d.pdf"), b"")?;

        let mut names: Vec<_> = discover_pdf_files(dir.path())
            .iter()
            .map(|path| document_name(path))
            .collect::<Result<_, _>>()?;
        names.sort();
        assert_eq!(names, vec!["B.PDF", "a.pdf"]);
        Ok(())
    }

    #[test]
    fn empty_folder_builds_empty_index() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        let report = build_index(
            &paths,
            &IndexerOptions::default(),
            &FakeExtractor::default(),
            &CharacterNgramEmbedder::default(),
        )?;

        assert_eq!(report.status, "success");
        assert_eq!(report.chunk_count, 0);
        assert!(report.message.is_some());

        let snapshot = IndexSnapshot::load(&paths, 384)?;
        assert_eq!(snapshot.index.len(), 0);
        assert_eq!(snapshot.index.dimension(), 384);
        assert!(snapshot.metadata.is_empty());
        assert_eq!(fs::read_to_string(&paths.metadata_file)?, "");
        assert_eq!(
            stored_fingerprint(&paths),
            Some(folder_fingerprint(&paths.documents_dir))
        );
        Ok(())
    }

    #[test]
    fn thousand_character_document_yields_two_records() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        touch(&paths, "doc.pdf")?;
        let extractor = FakeExtractor::default().with("doc.pdf", text_of_len(1000));

        let report = build_index(
            &paths,
            &IndexerOptions::default(),
            &extractor,
            &CharacterNgramEmbedder::default(),
        )?;

        assert_eq!(report.chunk_count, 2);
        assert!(report.message.is_none());
        assert_eq!(
            read_metadata(&paths.metadata_file)?,
            vec!["doc.pdf|chunk_0", "doc.pdf|chunk_1"]
        );
        assert_eq!(FlatL2Index::load(&paths.index_file)?.len(), 2);
        Ok(())
    }

    #[test]
    fn metadata_line_i_describes_vector_i() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        touch(&paths, "a.pdf")?;
        touch(&paths, "b.pdf")?;
        let extractor = FakeExtractor::default()
            .with("a.pdf", format!("alpha {}", text_of_len(1500)))
            .with("b.pdf", format!("bravo {}", text_of_len(300)));
        let embedder = CharacterNgramEmbedder::default();

        build_index(&paths, &IndexerOptions::default(), &extractor, &embedder)?;

        let snapshot = IndexSnapshot::load(&paths, 384)?;
        assert_eq!(snapshot.index.len(), snapshot.metadata.len());

        let config = ChunkingConfig::default();
        for (position, line) in snapshot.metadata.iter().enumerate() {
            let parsed = MetadataLine::parse(line).ok_or("bad metadata line")?;
            let chunks = document_chunks(
                &extractor,
                &paths.documents_dir.join(&parsed.document_name),
                config,
            )?;
            let chunk_index = parsed.chunk_index().ok_or("bad chunk id")?;
            let expected = embedder.embed(&chunks[chunk_index])?;

            let nearest = snapshot.index.search(&expected, 1)?;
            assert_eq!(nearest[0].position, position);
            assert!(nearest[0].distance < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn failing_documents_are_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        touch(&paths, "good.pdf")?;
        touch(&paths, "corrupt.pdf")?;
        touch(&paths, "poisoned.pdf")?;
        touch(&paths, "blank.pdf")?;
        let extractor = FakeExtractor::default()
            .with("good.pdf", text_of_len(200))
            .with("poisoned.pdf", format!("POISON {}", text_of_len(200)))
            .with("blank.pdf", "   ");
        let embedder = PoisonedEmbedder {
            inner: CharacterNgramEmbedder::default(),
            poison: "POISON",
        };

        let report = build_index(&paths, &IndexerOptions::default(), &extractor, &embedder)?;

        assert_eq!(report.chunk_count, 1);
        assert_eq!(read_metadata(&paths.metadata_file)?, vec!["good.pdf|chunk_0"]);

        let mut skipped: Vec<_> = report
            .skipped
            .iter()
            .filter_map(|entry| entry.path.file_name().and_then(|name| name.to_str()))
            .collect();
        skipped.sort_unstable();
        assert_eq!(skipped, vec!["corrupt.pdf", "poisoned.pdf"]);
        Ok(())
    }

    #[test]
    fn unreadable_real_pdf_contributes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        touch(&paths, "unreadable.pdf")?;

        let report = build_index(
            &paths,
            &IndexerOptions::default(),
            &LopdfExtractor,
            &CharacterNgramEmbedder::default(),
        )?;

        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(FlatL2Index::load(&paths.index_file)?.dimension(), 384);
        Ok(())
    }

    #[test]
    fn rebuild_is_idempotent_and_overwrites() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        touch(&paths, "a.pdf")?;
        touch(&paths, "b.pdf")?;
        let extractor = FakeExtractor::default()
            .with("a.pdf", text_of_len(2000))
            .with("b.pdf", text_of_len(900));
        let embedder = CharacterNgramEmbedder::default();
        let options = IndexerOptions::default();

        build_index(&paths, &options, &extractor, &embedder)?;
        let first = fs::read_to_string(&paths.metadata_file)?;
        build_index(&paths, &options, &extractor, &embedder)?;
        assert_eq!(first, fs::read_to_string(&paths.metadata_file)?);

        fs::remove_file(paths.documents_dir.join("a.pdf"))?;
        let report = build_index(&paths, &options, &extractor, &embedder)?;
        assert_eq!(report.chunk_count, 2);
        assert_eq!(
            read_metadata(&paths.metadata_file)?,
            vec!["b.pdf|chunk_0", "b.pdf|chunk_1"]
        );
        Ok(())
    }

    #[test]
    fn generated_pdf_is_indexed_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        crate::extractor::tests::write_text_pdf(
            &paths.documents_dir.join("network.pdf"),
            &["The data link layer provides framing, error detection and flow control."],
        )?;

        let report = build_index(
            &paths,
            &IndexerOptions::default(),
            &LopdfExtractor,
            &CharacterNgramEmbedder::default(),
        )?;

        assert_eq!(report.chunk_count, 1);
        assert_eq!(read_metadata(&paths.metadata_file)?, vec!["network.pdf|chunk_0"]);
        Ok(())
    }

    #[test]
    fn invalid_chunk_config_fails_before_writing() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, paths) = workspace()?;
        let options = IndexerOptions {
            chunk_overlap: 800,
            ..IndexerOptions::default()
        };

        let result = build_index(
            &paths,
            &options,
            &FakeExtractor::default(),
            &CharacterNgramEmbedder::default(),
        );
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        assert!(!paths.index_file.exists());
        Ok(())
    }
}
