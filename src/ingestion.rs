use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    codec,
    error::{Layer, Result},
    page::PageUpdate,
    walker::{self, PageFile},
    wiki::Wiki,
};

/// Counts from an import pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Pages written to the store.
    pub imported: usize,
    /// Files that could not be read or decoded.
    pub skipped: usize,
    /// Pages stored whose index update failed.
    pub stale: usize,
}

/// Read and decode one page file.
pub fn read_page_file(path: &Path) -> Result<PageUpdate> {
    let text = std::fs::read_to_string(path)?;
    codec::decode(&text)
}

/// Import the given page files into the wiki.
///
/// Files are read and decoded in parallel, then written one at a time.
/// Unreadable or malformed files are skipped with a warning.
pub fn import_files(wiki: &Wiki, files: &[PageFile]) -> Result<ImportReport> {
    let loaded: Vec<_> = files
        .par_iter()
        .map(|file| (file, read_page_file(&file.path)))
        .collect();

    let mut report = ImportReport::default();
    for (file, decoded) in loaded {
        let update = match decoded {
            Ok(update) => update,
            Err(err) => {
                tracing::warn!(
                    path = %file.path.display(),
                    error = %err,
                    "skipping page file"
                );
                report.skipped += 1;
                continue;
            }
        };

        match wiki.put_page(&file.slug, update) {
            Ok(_) => report.imported += 1,
            Err(err) if err.is_partial() => {
                report.imported += 1;
                report.stale += 1;
            }
            Err(err) if err.layer() == Layer::Input => {
                tracing::warn!(slug = %file.slug, error = %err, "skipping page");
                report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

/// Import every page file in `dir`.
pub fn import_dir(wiki: &Wiki, dir: &Path) -> Result<ImportReport> {
    let files = walker::discover_pages(dir)?;
    let report = import_files(wiki, &files)?;
    tracing::info!(
        dir = %dir.display(),
        imported = report.imported,
        skipped = report.skipped,
        "import finished"
    );
    Ok(report)
}

/// Write every stored page to `dir` as `<slug>.md`. Returns the page count.
pub fn export_dir(wiki: &Wiki, dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)?;
    let pages = wiki.pages()?;
    for (slug, page) in &pages {
        let text = codec::encode(&page.to_update())?;
        std::fs::write(walker::page_path(dir, slug), text)?;
    }
    tracing::info!(dir = %dir.display(), pages = pages.len(), "export finished");
    Ok(pages.len())
}
