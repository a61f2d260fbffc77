use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{error::Result, page::validate_slug};

/// Extension of page files in a wiki directory.
pub const PAGE_EXTENSION: &str = "md";

/// What a directory scan remembers about a file to notice later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime: SystemTime,
    pub len: u64,
}

/// A `<slug>.md` file found in a wiki directory.
#[derive(Debug, Clone)]
pub struct PageFile {
    pub slug: String,
    pub path: PathBuf,
    pub stamp: FileStamp,
}

/// Path of the file holding `slug` inside `root`.
pub fn page_path(root: &Path, slug: &str) -> PathBuf {
    root.join(format!("{slug}.{PAGE_EXTENSION}"))
}

/// List the page files directly inside `root`, sorted by slug.
///
/// Subdirectories, hidden files, other extensions, and names that are not
/// valid slugs are skipped. Symlinks to files are followed.
pub fn discover_pages(root: &Path) -> Result<Vec<PageFile>> {
    let mut results = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXTENSION) {
            continue;
        }
        let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        if slug.starts_with('.') {
            continue;
        }
        if let Err(err) = validate_slug(slug) {
            tracing::warn!(path = %path.display(), error = %err, "skipping file");
            continue;
        }

        // Follows symlinks; broken links are skipped.
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        results.push(PageFile {
            slug: slug.to_string(),
            stamp: FileStamp {
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                len: metadata.len(),
            },
            path,
        });
    }

    results.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(results)
}
