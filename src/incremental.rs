use std::collections::{HashMap, HashSet};

use crate::walker::{FileStamp, PageFile};

/// Result of comparing a directory scan against the previous one.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Files not seen before.
    pub new_files: Vec<PageFile>,
    /// Files whose stamp differs from the last scan.
    pub changed_files: Vec<PageFile>,
    /// Slugs seen last time that are gone now, sorted.
    pub deleted_slugs: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.changed_files.is_empty()
            && self.deleted_slugs.is_empty()
    }
}

/// Compare `discovered` against the stamps remembered from the last scan.
pub fn diff_pages(
    known: &HashMap<String, FileStamp>,
    discovered: &[PageFile],
) -> DiffResult {
    let mut result = DiffResult::default();
    let mut seen = HashSet::with_capacity(discovered.len());

    for file in discovered {
        seen.insert(file.slug.as_str());
        match known.get(&file.slug) {
            None => result.new_files.push(file.clone()),
            Some(stamp) if *stamp != file.stamp => {
                result.changed_files.push(file.clone());
            }
            Some(_) => {}
        }
    }

    result.deleted_slugs = known
        .keys()
        .filter(|slug| !seen.contains(slug.as_str()))
        .cloned()
        .collect();
    result.deleted_slugs.sort();

    result
}

/// The stamps to remember after a scan.
pub fn stamps(discovered: &[PageFile]) -> HashMap<String, FileStamp> {
    discovered
        .iter()
        .map(|file| (file.slug.clone(), file.stamp))
        .collect()
}
