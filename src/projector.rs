use crate::{
    error::Result,
    page::Page,
    query::{SearchRequest, SearchResults},
    search_index::{IndexDocument, SearchIndex},
    text_util,
};

/// Keeps the search index in step with stored pages.
///
/// Every index mutation goes through here; documents are always built by
/// [`Projector::document`].
#[derive(Debug)]
pub struct Projector {
    index: SearchIndex,
}

impl Projector {
    pub fn new(index: SearchIndex) -> Self {
        Self { index }
    }

    /// Derive the index document for the page stored at `id`.
    pub fn document(id: &str, page: &Page) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            title: page.metadata.title.clone(),
            contents: text_util::strip_markup(&page.contents),
            tags: page.metadata.tags.clone(),
            modified: page.metadata.modified,
        }
    }

    /// Insert or replace the document for `id`. Safe to repeat.
    pub fn index_page(&self, id: &str, page: &Page) -> Result<()> {
        tracing::debug!(id, "indexing page");
        self.index.upsert(&Self::document(id, page))
    }

    /// Remove the document for `id`. Missing documents are not an error.
    pub fn delete_page(&self, id: &str) -> Result<()> {
        tracing::debug!(id, "removing page from index");
        self.index.delete(id)
    }

    pub fn execute_search(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResults> {
        self.index.search(request)
    }

    /// Replace the whole index with the given pages.
    pub fn rebuild<'a, I>(&self, pages: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a Page)>,
    {
        let docs = pages
            .into_iter()
            .map(|(id, page)| Self::document(id, page));
        self.index.replace_all(docs)
    }

    /// Ids of every indexed document, sorted.
    pub fn indexed_ids(&self) -> Result<Vec<String>> {
        self.index.ids()
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{page::PageUpdate, search_index::WriterOptions};

    fn projector() -> Projector {
        Projector::new(
            SearchIndex::open_in_ram(WriterOptions::default()).unwrap(),
        )
    }

    #[test]
    fn markup_is_stripped_before_indexing() {
        let page = PageUpdate::new(
            "<div class=\"note\">visible</div><!-- secret -->",
            "T",
            Vec::<String>::new(),
        )
        .into_page(Utc::now());
        let doc = Projector::document("p", &page);
        assert_eq!(doc.contents, "visible ");

        let projector = projector();
        projector.index_page("p", &page).unwrap();
        let search = |q: &str| {
            projector.execute_search(&SearchRequest::new(q)).unwrap().total
        };
        assert_eq!(search("visible"), 1);
        assert_eq!(search("secret"), 0);
        assert_eq!(search("div"), 0);
    }

    #[test]
    fn index_and_delete_are_idempotent() {
        let projector = projector();
        let page = PageUpdate::new("hello", "Hello", ["a"]).into_page(Utc::now());
        projector.index_page("p", &page).unwrap();
        projector.index_page("p", &page).unwrap();
        assert_eq!(projector.indexed_ids().unwrap(), vec!["p"]);

        projector.delete_page("p").unwrap();
        projector.delete_page("p").unwrap();
        assert!(projector.indexed_ids().unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_everything() {
        let projector = projector();
        let stale = PageUpdate::new("old", "", ["x"]).into_page(Utc::now());
        projector.index_page("stale", &stale).unwrap();

        let a = PageUpdate::new("a", "A", ["x"]).into_page(Utc::now());
        let b = PageUpdate::new("b", "B", ["y"]).into_page(Utc::now());
        let count = projector.rebuild([("a", &a), ("b", &b)]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(projector.indexed_ids().unwrap(), vec!["a", "b"]);
    }
}
