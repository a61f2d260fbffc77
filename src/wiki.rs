use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use serde::Serialize;

use crate::{
    config::{Config, DEFAULT_ADMIN_PASSWORD},
    data_dir::DataDir,
    error::{Error, Result},
    page::{Page, PageUpdate, validate_slug},
    projector::Projector,
    query::{
        DEFAULT_FACET_LIMIT,
        SearchHit,
        SearchRequest,
        SearchResults,
        SortField,
        SortKey,
        TagCount,
    },
    record_store::{Collection, RecordStore},
    search_index::{SearchIndex, WriterOptions},
};

/// Page operations over the record store and the search index.
///
/// The record store is the source of truth. Every write lands there first;
/// the index is updated afterwards and a failure at that point is reported
/// as [`Error::IndexStale`] without undoing the stored change.
///
/// Writes to the same slug are serialized, so the store write and the
/// index update of one call never interleave with another's.
#[derive(Debug)]
pub struct Wiki {
    store: RecordStore,
    projector: Projector,
    slug_locks: [Mutex<()>; SLUG_LOCK_STRIPES],
}

const SLUG_LOCK_STRIPES: usize = 64;

/// Outcome of a full index rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub pages: usize,
}

/// Differences between stored page keys and indexed document ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Stored pages with no index document.
    pub missing: Vec<String>,
    /// Index documents with no stored page.
    pub orphaned: Vec<String>,
}

impl DriftReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }

    /// The report as an [`Error::Drift`].
    pub fn into_error(self) -> Error {
        Error::Drift {
            missing: self.missing.len(),
            orphaned: self.orphaned.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub pages: usize,
    pub users: usize,
    pub indexed: u64,
}

impl Wiki {
    pub fn new(store: RecordStore, projector: Projector) -> Self {
        Self {
            store,
            projector,
            slug_locks: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Open the stores under `data_dir` as configured.
    ///
    /// An in-memory index starts empty, so it is rebuilt from the store
    /// before returning. A store without users gets the configured admin
    /// account, with [`DEFAULT_ADMIN_PASSWORD`] when none is configured.
    pub fn open(data_dir: &DataDir, config: &Config) -> Result<Self> {
        let store = RecordStore::open(
            &data_dir.records_db(),
            config.store_open_timeout(),
        )?;
        let options = config.writer_options();
        let index = if config.index_in_memory {
            SearchIndex::open_in_ram(options)?
        } else {
            SearchIndex::open(&data_dir.index_dir()?, options)?
        };

        let wiki = Self::new(store, Projector::new(index));
        wiki.bootstrap_admin(config)?;
        if config.index_in_memory {
            wiki.reindex()?;
        }
        Ok(wiki)
    }

    fn bootstrap_admin(&self, config: &Config) -> Result<()> {
        let username = config.admin_username.as_str();
        let password = config
            .admin_password
            .as_deref()
            .unwrap_or(DEFAULT_ADMIN_PASSWORD);
        let created = self.store.ensure_default_admin(username, password)?;
        if created && config.admin_password.is_none() {
            tracing::warn!(
                username,
                "created admin account with the default password; \
                 change it with `wikipad user passwd`"
            );
        }
        Ok(())
    }

    /// A wiki with both stores in memory.
    pub fn open_in_memory(options: WriterOptions) -> Result<Self> {
        Ok(Self::new(
            RecordStore::open_in_memory()?,
            Projector::new(SearchIndex::open_in_ram(options)?),
        ))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    fn stripe(slug: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        slug.hash(&mut hasher);
        (hasher.finish() as usize) % SLUG_LOCK_STRIPES
    }

    fn lock_stripe(&self, stripe: usize) -> MutexGuard<'_, ()> {
        self.slug_locks[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slug(&self, slug: &str) -> MutexGuard<'_, ()> {
        self.lock_stripe(Self::stripe(slug))
    }

    /// Locks for both slugs, taken in stripe order.
    fn lock_pair(
        &self,
        a: &str,
        b: &str,
    ) -> (MutexGuard<'_, ()>, Option<MutexGuard<'_, ()>>) {
        let (sa, sb) = (Self::stripe(a), Self::stripe(b));
        if sa == sb {
            return (self.lock_stripe(sa), None);
        }
        let (first, second) = if sa < sb { (sa, sb) } else { (sb, sa) };
        let first = self.lock_stripe(first);
        (first, Some(self.lock_stripe(second)))
    }

    fn stale(slug: &str, err: Error) -> Error {
        tracing::warn!(slug, error = %err, "search index not updated");
        Error::stale(slug, err)
    }

    /// Store `update` at `slug`, stamping it with the current time, and
    /// index it. Returns the page as stored.
    pub fn put_page(&self, slug: &str, update: PageUpdate) -> Result<Page> {
        validate_slug(slug)?;
        let page = update.normalized()?.into_page(Utc::now());
        let _guard = self.lock_slug(slug);
        self.store.put_json(Collection::Pages, slug, &page)?;
        tracing::debug!(slug, "page stored");

        self.projector
            .index_page(slug, &page)
            .map_err(|e| Self::stale(slug, e))?;
        Ok(page)
    }

    pub fn get_page(&self, slug: &str) -> Result<Option<Page>> {
        self.store.get_json(Collection::Pages, slug)
    }

    pub fn page_exists(&self, slug: &str) -> Result<bool> {
        self.store.exists(Collection::Pages, slug)
    }

    /// Delete `slug` from both stores. Returns whether the page existed.
    ///
    /// The index document is removed even when the page was already gone,
    /// which clears any leftover from an earlier partial failure.
    pub fn delete_page(&self, slug: &str) -> Result<bool> {
        let _guard = self.lock_slug(slug);
        let removed = self.store.delete(Collection::Pages, slug)?;
        tracing::debug!(slug, removed, "page deleted");
        self.projector
            .delete_page(slug)
            .map_err(|e| Self::stale(slug, e))?;
        Ok(removed)
    }

    /// Move the page at `old` to `new`, keeping its contents and timestamp.
    ///
    /// Fails with `Conflict` if `new` exists and `NotFound` if `old` does
    /// not; neither store changes in that case. The new index document is
    /// built from a fresh read of the store.
    pub fn rename_page(&self, old: &str, new: &str) -> Result<()> {
        validate_slug(new)?;
        let _guards = self.lock_pair(old, new);
        self.store.rename(Collection::Pages, old, new)?;
        tracing::debug!(old, new, "page renamed");

        let reindex = || -> Result<()> {
            self.projector.delete_page(old)?;
            match self.get_page(new)? {
                Some(page) => self.projector.index_page(new, &page),
                None => self.projector.delete_page(new),
            }
        };
        reindex().map_err(|e| Self::stale(new, e))
    }

    /// Slugs of every stored page, sorted.
    pub fn list_pages(&self) -> Result<Vec<String>> {
        self.store.keys(Collection::Pages)
    }

    /// Every stored page with its slug, sorted by slug.
    pub fn pages(&self) -> Result<Vec<(String, Page)>> {
        self.store
            .entries(Collection::Pages)?
            .into_iter()
            .map(|(slug, bytes)| Ok((slug, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    pub fn count_pages(&self) -> Result<usize> {
        self.store.count(Collection::Pages)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        tracing::debug!(
            query = %request.query,
            tags = request.tags.len(),
            from = request.from,
            size = request.size,
            "search"
        );
        self.projector.execute_search(request)
    }

    /// Every tag in use with the number of pages carrying it, most used
    /// first, at most `limit` of them.
    pub fn tag_counts(&self, limit: Option<usize>) -> Result<Vec<TagCount>> {
        let request = SearchRequest::default()
            .paginate(0, 0)
            .with_facets(limit.unwrap_or(DEFAULT_FACET_LIMIT));
        Ok(self.search(&request)?.facets)
    }

    /// Pages carrying `tag`, ordered by title.
    pub fn pages_with_tag(&self, tag: &str) -> Result<Vec<SearchHit>> {
        let request = SearchRequest::default()
            .with_tag(tag)
            .paginate(0, DEFAULT_FACET_LIMIT)
            .sort_by(SortKey::ascending(SortField::Title));
        Ok(self.search(&request)?.hits)
    }

    /// Bring the index document for `slug` in line with the store.
    ///
    /// Returns whether the page exists.
    pub fn reproject(&self, slug: &str) -> Result<bool> {
        let _guard = self.lock_slug(slug);
        match self.get_page(slug)? {
            Some(page) => {
                self.projector.index_page(slug, &page)?;
                Ok(true)
            }
            None => {
                self.projector.delete_page(slug)?;
                Ok(false)
            }
        }
    }

    /// Rebuild the whole index from the record store.
    pub fn reindex(&self) -> Result<ReindexReport> {
        let pages = self.pages()?;
        let count = self
            .projector
            .rebuild(pages.iter().map(|(slug, page)| (slug.as_str(), page)))?;
        tracing::info!(pages = count, "search index rebuilt");
        Ok(ReindexReport { pages: count })
    }

    /// Compare stored slugs with indexed ids.
    pub fn check_consistency(&self) -> Result<DriftReport> {
        let stored = self.list_pages()?;
        let indexed = self.projector.indexed_ids()?;
        Ok(DriftReport {
            missing: sorted_difference(&stored, &indexed),
            orphaned: sorted_difference(&indexed, &stored),
        })
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            pages: self.count_pages()?,
            users: self.store.count_users()?,
            indexed: self.projector.search_index().num_docs(),
        })
    }
}

/// Items of sorted `a` not in sorted `b`.
fn sorted_difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter()
        .filter(|item| b.binary_search(item).is_err())
        .cloned()
        .collect()
}
