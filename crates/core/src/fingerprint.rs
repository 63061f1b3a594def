use crate::ingest::discover_pdf_files;
use crate::store::IndexPaths;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

/// Hash over the path and modification time of every PDF in `folder`.
///
/// Files are visited in sorted path order. An absent folder gives the empty string.
pub fn folder_fingerprint(folder: &Path) -> String {
    if !folder.is_dir() {
        return String::new();
    }

    let mut files = discover_pdf_files(folder);
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        let Ok(modified) = fs::metadata(&path).and_then(|meta| meta.modified()) else {
            continue;
        };
        let modified = DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Nanos, true);
        hasher.update(format!("{}-{}", path.display(), modified).as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

pub fn stored_fingerprint(paths: &IndexPaths) -> Option<String> {
    fs::read_to_string(&paths.fingerprint_file)
        .ok()
        .map(|value| value.trim().to_string())
}

/// Recomputes the fingerprint of the documents folder and writes it next to the index.
pub fn update_fingerprint(paths: &IndexPaths) -> io::Result<String> {
    let current = folder_fingerprint(&paths.documents_dir);
    fs::write(&paths.fingerprint_file, &current)?;
    Ok(current)
}

pub fn needs_rebuild(paths: &IndexPaths) -> bool {
    stored_fingerprint(paths).as_deref() != Some(folder_fingerprint(&paths.documents_dir).as_str())
}
