//! Keep the wiki in step with a directory of page files edited outside the
//! wiki.
//!
//! Each scan lists `<slug>.md` files, compares them with the previous scan,
//! and applies the differences through [`Wiki`], so synced pages are stored
//! and indexed exactly like pages written any other way. Decisions are made
//! against the record store rather than against the change itself: a file
//! whose content matches the stored page is only re-projected.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    incremental,
    ingestion::read_page_file,
    walker::{self, FileStamp},
    wiki::Wiki,
};

/// Counts from one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pages stored from new or edited files.
    pub written: usize,
    /// Touched files whose content already matched the store.
    pub reprojected: usize,
    /// Pages deleted because their file disappeared.
    pub deleted: usize,
    /// Files that could not be read or decoded.
    pub skipped: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Scanner state for one page directory.
#[derive(Debug)]
pub struct DirectorySync {
    root: PathBuf,
    known: HashMap<String, FileStamp>,
}

impl DirectorySync {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply every change since the previous scan.
    ///
    /// The first scan treats every file as new. Pages that exist only in the
    /// store are left alone; only files that disappear between scans cause
    /// deletions. If the store fails mid-scan, the file state is not
    /// remembered and the next scan retries.
    pub fn scan(&mut self, wiki: &Wiki) -> Result<SyncReport> {
        let files = walker::discover_pages(&self.root)?;
        let diff = incremental::diff_pages(&self.known, &files);
        let mut report = SyncReport::default();

        for file in diff.new_files.iter().chain(&diff.changed_files) {
            let update = match read_page_file(&file.path) {
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

            let unchanged = wiki
                .get_page(&file.slug)?
                .is_some_and(|page| page.to_update() == update);
            let outcome = if unchanged {
                wiki.reproject(&file.slug).map(|_| {
                    report.reprojected += 1;
                })
            } else {
                wiki.put_page(&file.slug, update).map(|_| {
                    report.written += 1;
                })
            };
            tolerate_partial(outcome, &mut report)?;
        }

        for slug in &diff.deleted_slugs {
            let outcome = wiki.delete_page(slug).map(|_| {
                report.deleted += 1;
            });
            tolerate_partial(outcome, &mut report)?;
        }

        self.known = incremental::stamps(&files);
        Ok(report)
    }
}

/// Index-only and input failures affect a single page; keep scanning.
fn tolerate_partial(outcome: Result<()>, report: &mut SyncReport) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) if err.is_partial() => Ok(()),
        Err(Error::Validation(reason)) => {
            tracing::warn!(reason = %reason, "skipping page");
            report.skipped += 1;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Scan `root` every `interval` until `shutdown` turns true or its sender
/// is dropped.
///
/// Scans run on the blocking pool. A failed scan is logged and retried on
/// the next tick. A zero `interval` is a [`Error::Config`].
pub async fn run(
    wiki: Arc<Wiki>,
    root: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::Config(
            "sync interval must be greater than zero".to_string(),
        ));
    }
    let mut sync = DirectorySync::new(root);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(dir = %sync.root().display(), "watching page directory");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let wiki = Arc::clone(&wiki);
                let (returned, outcome) =
                    tokio::task::spawn_blocking(move || {
                        let outcome = sync.scan(&wiki);
                        (sync, outcome)
                    })
                    .await
                    .map_err(|e| Error::Config(format!("sync task failed: {e}")))?;
                sync = returned;

                match outcome {
                    Ok(report) if !report.is_empty() => {
                        tracing::info!(
                            written = report.written,
                            reprojected = report.reprojected,
                            deleted = report.deleted,
                            skipped = report.skipped,
                            "directory synced"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "sync scan failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("directory sync stopped");
    Ok(())
}
