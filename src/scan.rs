//! Source discovery.
//!
//! Walks the content root and returns every source file with the configured
//! extension, together with the page [`Location`] it builds to.
//!
//! ```text
//! content/                    # Content root
//! ├── nocturne.toml           # Site configuration (optional)
//! ├── index.org               # → index
//! ├── notes/
//! │   ├── rust.org            # → notes/rust
//! │   └── scratch.txt         # ignored: other extension
//! ├── .drafts/                # ignored: hidden directory
//! └── dist/                   # ignored: output directory
//! ```
//!
//! Results are sorted by location so builds and logs are deterministic.

use crate::config::BuildConfig;
use crate::naming::location_for;
use crate::types::Location;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Content root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// One page to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub location: Location,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Find every source file under `root`, skipping hidden entries and
/// `output_dir`.
#[instrument(skip(config), fields(extension = %config.source_extension))]
pub fn scan(
    root: &Path,
    config: &BuildConfig,
    output_dir: &Path,
) -> Result<Vec<SourceFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut sources = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry) && !entry.path().starts_with(output_dir));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), &config.source_extension) {
            continue;
        }
        let location = location_for(entry.path(), root);
        debug!(path = %entry.path().display(), %location, "found source");
        sources.push(SourceFile {
            path: entry.into_path(),
            location,
        });
    }
    sources.sort_by(|a, b| a.location.cmp(&b.location));
    info!(pages = sources.len(), "scan complete");
    Ok(sources)
}
