//! Search requests and results at the library boundary.
//!
//! [`SearchParams`] carries raw, untrusted strings (as they would arrive from
//! a query string or the command line). [`SearchParams::into_request`]
//! validates them into a typed [`SearchRequest`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Facet cap large enough to mean "every tag".
pub const DEFAULT_FACET_LIMIT: usize = 10_000;

/// A field search results can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Score,
    Title,
    Modified,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

impl FromStr for SortKey {
    type Err = Error;

    /// Parse `title`, `-modified`, `_score`, ... A leading `-` reverses.
    fn from_str(s: &str) -> Result<Self> {
        let (name, descending) = match s.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let field = match name {
            "_score" => SortField::Score,
            "title" => SortField::Title,
            "modified" => SortField::Modified,
            "id" => SortField::Id,
            other => {
                return Err(Error::Validation(format!(
                    "unknown sort field {other:?} \
                     (expected title, modified, id or _score)"
                )));
            }
        };
        Ok(Self { field, descending })
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free-text query; empty matches every page.
    pub query: String,
    /// Exact tag filters, all of which must match.
    pub tags: Vec<String>,
    pub from: usize,
    pub size: usize,
    /// Sort keys, primary first. Empty means relevance order.
    pub sort: Vec<SortKey>,
    /// Return tag counts, capped at this many distinct tags.
    pub facets: Option<usize>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            tags: Vec::new(),
            from: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: Vec::new(),
            facets: None,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn paginate(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_facets(mut self, limit: usize) -> Self {
        self.facets = Some(limit);
        self
    }
}

/// Raw search parameters, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub tag: Vec<String>,
    pub from: Option<String>,
    pub size: Option<String>,
    pub sort: Vec<String>,
    pub facets: Option<String>,
}

impl SearchParams {
    /// Validate into a [`SearchRequest`].
    ///
    /// `from`, `size` and `facets` must be non-negative integers when
    /// present; anything else is a [`Error::Validation`].
    pub fn into_request(self) -> Result<SearchRequest> {
        let from = parse_count("from", self.from.as_deref())?.unwrap_or(0);
        let size = parse_count("size", self.size.as_deref())?
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let facets = parse_count("facets", self.facets.as_deref())?;
        let sort = self
            .sort
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse())
            .collect::<Result<Vec<SortKey>>>()?;

        Ok(SearchRequest {
            query: self.q.unwrap_or_default(),
            tags: self.tag.into_iter().filter(|t| !t.is_empty()).collect(),
            from,
            size,
            sort,
            facets,
        })
    }
}

impl TryFrom<SearchParams> for SearchRequest {
    type Error = Error;

    fn try_from(params: SearchParams) -> Result<Self> {
        params.into_request()
    }
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<usize>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<usize>().map(Some).map_err(|_| {
            Error::Validation(format!(
                "{name} must be a non-negative integer, got {value:?}"
            ))
        }),
    }
}

/// One matching page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub title: String,
    pub tags: Vec<String>,
    pub modified: DateTime<Utc>,
    /// Markup-free excerpt of the page around the first query term.
    pub snippet: String,
}

/// A tag and the number of matching pages carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Number of matching pages, before pagination.
    pub total: usize,
    pub hits: Vec<SearchHit>,
    /// Tag counts over all matching pages; empty unless requested.
    pub facets: Vec<TagCount>,
}
