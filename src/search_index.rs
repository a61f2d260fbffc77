use std::{
    cmp::Ordering,
    path::Path,
    sync::{Mutex, MutexGuard, TryLockError},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    Term,
    collector::{Count, DocSetCollector, FacetCollector, TopDocs},
    query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{
    error::{Error, Result},
    query::{
        SearchHit,
        SearchRequest,
        SearchResults,
        SortField,
        SortKey,
        TagCount,
    },
    text_util,
};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const CONTENTS: &str = "contents";
    pub const TAGS: &str = "tags";
    pub const TAG_FACET: &str = "tag_facet";
    pub const MODIFIED: &str = "modified";
}

/// Root of the per-tag facet paths (`/tags/<tag>`).
const TAG_FACET_ROOT: &str = "/tags";

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Writer memory budget used when none is configured.
pub const DEFAULT_WRITER_MEMORY: usize = 50_000_000;

/// Default wait for the index writer before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Heap budget handed to tantivy's writer, in bytes.
    pub memory_budget: usize,
    /// How long a write waits for the writer before failing.
    pub lock_timeout: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_WRITER_MEMORY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// The flattened, searchable form of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub id: String,
    pub title: String,
    /// Plain text, markup already removed.
    pub contents: String,
    pub tags: Vec<String>,
    pub modified: DateTime<Utc>,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    title: Field,
    contents: Field,
    tags: Field,
    tag_facet: Field,
    modified: Field,
}

/// Full-text index over wiki pages.
///
/// Holds the index's single [`IndexWriter`]. Every write takes the writer,
/// commits, and reloads the reader before returning, so a successful write
/// is visible to the next search.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
    lock_timeout: Duration,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);

    let stemmed = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let title = builder.add_text_field(fields::TITLE, stemmed.clone());
    let contents = builder.add_text_field(fields::CONTENTS, stemmed);

    let tags = builder.add_text_field(fields::TAGS, STRING | STORED);
    let tag_facet =
        builder.add_facet_field(fields::TAG_FACET, FacetOptions::default());
    let modified = builder.add_i64_field(fields::MODIFIED, STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        id,
        title,
        contents,
        tags,
        tag_facet,
        modified,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

impl SearchIndex {
    /// Open or create a search index in the given directory.
    pub fn open(dir: &Path, options: WriterOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index, fields, options)
    }

    /// Create an index that lives in memory only.
    pub fn open_in_ram(options: WriterOptions) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields, options)
    }

    fn from_index(
        index: Index,
        fields: SchemaFields,
        options: WriterOptions,
    ) -> Result<Self> {
        register_tokenizers(&index);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(options.memory_budget)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            lock_timeout: options.lock_timeout,
        })
    }

    /// Take the writer, waiting at most `lock_timeout`.
    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.writer.try_lock() {
                Ok(guard) => return Ok(guard),
                // Discard whatever a panicking holder left uncommitted.
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut guard = poisoned.into_inner();
                    guard.rollback()?;
                    return Ok(guard);
                }
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(TryLockError::WouldBlock) => {
                    return Err(Error::IndexBusy(format!(
                        "writer busy (waited {}ms)",
                        self.lock_timeout.as_millis()
                    )));
                }
            }
        }
    }

    /// Run `f` with the writer, then commit and reload the reader.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut IndexWriter, SchemaFields) -> Result<T>,
    ) -> Result<T> {
        let mut writer = self.lock_writer()?;
        let value = match f(&mut writer, self.fields) {
            Ok(value) => value,
            Err(err) => {
                writer.rollback()?;
                return Err(err);
            }
        };
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn hold_writer(&self) -> MutexGuard<'_, IndexWriter> {
        self.lock_writer().unwrap()
    }

    fn to_tantivy(fields: SchemaFields, doc: &IndexDocument) -> TantivyDocument {
        let mut out = TantivyDocument::default();
        out.add_text(fields.id, &doc.id);
        out.add_text(fields.title, &doc.title);
        out.add_text(fields.contents, &doc.contents);
        for tag in &doc.tags {
            out.add_text(fields.tags, tag);
            out.add_facet(
                fields.tag_facet,
                Facet::from_path(["tags", tag.as_str()]),
            );
        }
        out.add_i64(fields.modified, doc.modified.timestamp_millis());
        out
    }

    /// Insert or replace the document with `doc.id`.
    pub fn upsert(&self, doc: &IndexDocument) -> Result<()> {
        self.write(|writer, f| {
            writer.delete_term(Term::from_field_text(f.id, &doc.id));
            writer.add_document(Self::to_tantivy(f, doc))?;
            Ok(())
        })
    }

    /// Remove the document with `id`, if any.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.write(|writer, f| {
            writer.delete_term(Term::from_field_text(f.id, id));
            Ok(())
        })
    }

    /// Drop every document and index `docs` instead, in one commit.
    pub fn replace_all<I>(&self, docs: I) -> Result<usize>
    where
        I: IntoIterator<Item = IndexDocument>,
    {
        self.write(|writer, f| {
            writer.delete_all_documents()?;
            let mut count = 0;
            for doc in docs {
                writer.add_document(Self::to_tantivy(f, &doc))?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Every document id in the index, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;
        let mut ids = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            ids.push(extract_text(&doc, self.fields.id));
        }
        ids.sort();
        Ok(ids)
    }

    fn build_query(&self, request: &SearchRequest) -> Box<dyn Query> {
        let f = self.fields;
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let text = request.query.trim();
        if !text.is_empty() {
            let mut parser = QueryParser::for_index(
                &self.index,
                vec![f.title, f.contents, f.tags],
            );
            parser.set_field_boost(f.title, 2.0);
            let (query, errors) = parser.parse_query_lenient(text);
            if !errors.is_empty() {
                tracing::debug!(
                    query = text,
                    errors = errors.len(),
                    "query parsed leniently"
                );
            }
            clauses.push((Occur::Must, query));
        }

        for tag in &request.tags {
            let term = Term::from_field_text(f.tags, tag);
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        match clauses.len() {
            0 => Box::new(AllQuery),
            1 if request.tags.is_empty() => clauses.remove(0).1,
            _ => Box::new(BooleanQuery::new(clauses)),
        }
    }

    /// Run a search: free text and tag filters, sorted and paginated, with
    /// optional tag counts over the whole match set.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let f = self.fields;
        let searcher = self.reader.searcher();
        let query = self.build_query(request);

        let mut facet_collector = FacetCollector::for_field(fields::TAG_FACET);
        facet_collector.add_facet(TAG_FACET_ROOT);
        let (total, facet_counts) =
            searcher.search(query.as_ref(), &(Count, facet_collector))?;

        let facets = match request.facets {
            Some(limit) => {
                let mut counts: Vec<TagCount> = facet_counts
                    .get(TAG_FACET_ROOT)
                    .filter_map(|(facet, count)| {
                        facet.to_path().last().map(|tag| TagCount {
                            tag: (*tag).to_string(),
                            count,
                        })
                    })
                    .collect();
                counts.sort_by(|a, b| {
                    b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag))
                });
                counts.truncate(limit);
                counts
            }
            None => Vec::new(),
        };

        let snippet_term = request.query.split_whitespace().next().unwrap_or("");
        let to_hit = |score: f32, doc: &TantivyDocument| SearchHit {
            id: extract_text(doc, f.id),
            score,
            title: extract_text(doc, f.title),
            tags: doc
                .get_all(f.tags)
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            modified: DateTime::from_timestamp_millis(extract_i64(
                doc, f.modified,
            ))
            .unwrap_or_default(),
            snippet: text_util::extract_snippet(
                &extract_text(doc, f.contents),
                snippet_term,
            )
            .unwrap_or_default(),
        };

        let mut hits = Vec::new();
        // Never ask the collector for more than the matches past `from`.
        let size = request.size.min(total.saturating_sub(request.from));
        if size == 0 {
            // Counting only.
        } else if request.sort.is_empty() {
            let top = TopDocs::with_limit(size).and_offset(request.from);
            for (score, address) in searcher.search(query.as_ref(), &top)? {
                let doc: TantivyDocument = searcher.doc(address)?;
                hits.push(to_hit(score, &doc));
            }
        } else {
            let top = TopDocs::with_limit(total);
            for (score, address) in searcher.search(query.as_ref(), &top)? {
                let doc: TantivyDocument = searcher.doc(address)?;
                hits.push(to_hit(score, &doc));
            }
            hits.sort_by(|a, b| compare_hits(&request.sort, a, b));
            hits = hits
                .into_iter()
                .skip(request.from)
                .take(size)
                .collect();
        }

        Ok(SearchResults {
            total,
            hits,
            facets,
        })
    }
}

/// Order two hits by the sort keys in turn, falling back to id.
fn compare_hits(keys: &[SortKey], a: &SearchHit, b: &SearchHit) -> Ordering {
    for key in keys {
        let ord = match key.field {
            SortField::Score => a.score.total_cmp(&b.score),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Modified => a.modified.cmp(&b.modified),
            SortField::Id => a.id.cmp(&b.id),
        };
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_i64(doc: &TantivyDocument, field: Field) -> i64 {
    doc.get_first(field).and_then(|v| v.as_i64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(
        id: &str,
        title: &str,
        contents: &str,
        tags: &[&str],
    ) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            title: title.to_string(),
            contents: contents.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn sample_index() -> SearchIndex {
        let idx = SearchIndex::open_in_ram(WriterOptions::default()).unwrap();
        idx.upsert(&document(
            "rust",
            "Rust Guide",
            "programming language guide",
            &["lang", "systems"],
        ))
        .unwrap();
        idx.upsert(&document(
            "go",
            "Language Guide",
            "rust and go are programming languages",
            &["lang"],
        ))
        .unwrap();
        idx.upsert(&document("todo", "Todo", "buy milk", &["personal"]))
            .unwrap();
        idx
    }

    fn ids(results: &SearchResults) -> Vec<&str> {
        results.hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn title_boost() {
        let idx = sample_index();
        let results = idx.search(&SearchRequest::new("rust")).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(ids(&results), vec!["rust", "go"]);
    }

    #[test]
    fn stemming_works() {
        let idx = SearchIndex::open_in_ram(WriterOptions::default()).unwrap();
        idx.upsert(&document("a", "Running", "the runners were running", &[]))
            .unwrap();
        let results = idx.search(&SearchRequest::new("run")).unwrap();
        assert_eq!(ids(&results), vec!["a"]);
    }

    #[test]
    fn empty_query_matches_all() {
        let idx = sample_index();
        let results = idx.search(&SearchRequest::new("  ")).unwrap();
        assert_eq!(results.total, 3);
    }

    #[test]
    fn tags_are_exact_terms() {
        let idx = SearchIndex::open_in_ram(WriterOptions::default()).unwrap();
        idx.upsert(&document("a", "A", "", &["machine learning"]))
            .unwrap();
        idx.upsert(&document("b", "B", "", &["machine"])).unwrap();

        let req = SearchRequest::default().with_tag("machine");
        assert_eq!(ids(&idx.search(&req).unwrap()), vec!["b"]);

        let req = SearchRequest::default().with_tag("learning");
        assert_eq!(idx.search(&req).unwrap().total, 0);

        let req = SearchRequest::default().with_tag("machine learning");
        assert_eq!(ids(&idx.search(&req).unwrap()), vec!["a"]);
    }

    #[test]
    fn tag_filters_are_anded() {
        let idx = sample_index();
        let req = SearchRequest::default()
            .with_tag("lang")
            .with_tag("systems");
        assert_eq!(ids(&idx.search(&req).unwrap()), vec!["rust"]);

        let req = SearchRequest::new("guide").with_tag("personal");
        assert_eq!(idx.search(&req).unwrap().total, 0);
    }

    #[test]
    fn facets_count_matching_tags() {
        let idx = sample_index();
        let results = idx
            .search(&SearchRequest::default().paginate(0, 0).with_facets(10))
            .unwrap();
        assert!(results.hits.is_empty());
        assert_eq!(results.total, 3);
        let facets: Vec<_> = results
            .facets
            .iter()
            .map(|t| (t.tag.as_str(), t.count))
            .collect();
        assert_eq!(
            facets,
            vec![("lang", 2), ("personal", 1), ("systems", 1)]
        );

        let capped = idx
            .search(&SearchRequest::default().with_facets(1))
            .unwrap();
        assert_eq!(capped.facets.len(), 1);
        assert_eq!(capped.facets[0].tag, "lang");
    }

    #[test]
    fn facets_follow_the_query() {
        let idx = sample_index();
        let results = idx
            .search(&SearchRequest::new("milk").with_facets(100))
            .unwrap();
        assert_eq!(results.facets.len(), 1);
        assert_eq!(results.facets[0].tag, "personal");
    }

    #[test]
    fn sort_and_paginate() {
        let idx = sample_index();
        let req = SearchRequest::default()
            .sort_by(SortKey::ascending(SortField::Title))
            .paginate(0, 2);
        let results = idx.search(&req).unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(ids(&results), vec!["go", "rust"]);

        let req = SearchRequest::default()
            .sort_by(SortKey::ascending(SortField::Title))
            .paginate(2, 2);
        assert_eq!(ids(&idx.search(&req).unwrap()), vec!["todo"]);

        let req = SearchRequest::default()
            .sort_by(SortKey::descending(SortField::Id));
        assert_eq!(ids(&idx.search(&req).unwrap()), vec!["todo", "rust", "go"]);
    }

    #[test]
    fn relevance_pagination_offsets() {
        let idx = sample_index();
        let all = idx.search(&SearchRequest::new("rust")).unwrap();
        let second = idx
            .search(&SearchRequest::new("rust").paginate(1, 1))
            .unwrap();
        assert_eq!(second.total, 2);
        assert_eq!(ids(&second), vec![ids(&all)[1]]);

        let past_end = idx
            .search(&SearchRequest::new("rust").paginate(5, 10))
            .unwrap();
        assert!(past_end.hits.is_empty());
        assert_eq!(past_end.total, 2);
    }

    #[test]
    fn oversized_page_returns_remaining_hits() {
        let idx = sample_index();
        let all = idx
            .search(&SearchRequest::default().paginate(0, usize::MAX))
            .unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.hits.len(), 3);

        let rest = idx
            .search(&SearchRequest::default().paginate(1, usize::MAX))
            .unwrap();
        assert_eq!(rest.hits.len(), 2);

        let sorted = idx
            .search(
                &SearchRequest::default()
                    .sort_by(SortKey::ascending(SortField::Title))
                    .paginate(1, usize::MAX),
            )
            .unwrap();
        assert_eq!(ids(&sorted), vec!["rust", "todo"]);
    }

    #[test]
    fn upsert_replaces() {
        let idx = sample_index();
        idx.upsert(&document("todo", "Todo", "buy bread", &["errands"]))
            .unwrap();
        assert_eq!(idx.num_docs(), 3);
        assert_eq!(idx.search(&SearchRequest::new("milk")).unwrap().total, 0);

        let hit = &idx.search(&SearchRequest::new("bread")).unwrap().hits[0];
        assert_eq!(hit.id, "todo");
        assert_eq!(hit.tags, vec!["errands"]);
        assert_eq!(hit.modified.timestamp(), 1_700_000_000);
        assert!(hit.snippet.contains("bread"));
    }

    #[test]
    fn delete_is_idempotent() {
        let idx = sample_index();
        idx.delete("todo").unwrap();
        idx.delete("todo").unwrap();
        idx.delete("never-existed").unwrap();
        assert_eq!(idx.ids().unwrap(), vec!["go", "rust"]);
    }

    #[test]
    fn replace_all_rebuilds() {
        let idx = sample_index();
        let count = idx
            .replace_all(vec![document("only", "Only", "one", &[])])
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(idx.ids().unwrap(), vec!["only"]);
    }

    #[test]
    fn busy_writer_times_out() {
        let idx = SearchIndex::open_in_ram(WriterOptions {
            lock_timeout: Duration::from_millis(50),
            ..WriterOptions::default()
        })
        .unwrap();
        let guard = idx.hold_writer();
        let err = idx.upsert(&document("a", "A", "", &[])).unwrap_err();
        assert!(matches!(err, Error::IndexBusy(_)), "{err:?}");
        assert_eq!(err.layer(), crate::error::Layer::Index);
        drop(guard);
        idx.upsert(&document("a", "A", "", &[])).unwrap();
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let idx = SearchIndex::open(&dir, WriterOptions::default()).unwrap();
            idx.upsert(&document("abc", "Test", "persistent data", &["x"]))
                .unwrap();
        }

        let idx = SearchIndex::open(&dir, WriterOptions::default()).unwrap();
        let results = idx.search(&SearchRequest::new("persistent")).unwrap();
        assert_eq!(ids(&results), vec!["abc"]);
        assert_eq!(results.hits[0].tags, vec!["x"]);
    }
}
