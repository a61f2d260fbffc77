use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest slug accepted, in bytes. `<slug>.md` must fit in a 255-byte file
/// name.
pub const MAX_SLUG_LEN: usize = 255 - ".md".len();

/// A stored wiki page, as held in the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub contents: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set by the store on every successful put.
    pub modified: DateTime<Utc>,
}

/// Page content as supplied by a client. There is no `modified` field: the
/// timestamp is always assigned server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUpdate {
    pub contents: String,
    pub title: String,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct PageInput {
    #[serde(default)]
    contents: String,
    #[serde(default)]
    metadata: MetadataInput,
}

#[derive(Default, Deserialize)]
struct MetadataInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    modified: Option<serde_json::Value>,
}

impl PageUpdate {
    pub fn new(
        contents: impl Into<String>,
        title: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            contents: contents.into(),
            title: title.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the page read/write JSON shape
    /// (`{"contents": .., "metadata": {"title": .., "tags": [..]}}`).
    ///
    /// A client-supplied `metadata.modified` is accepted and discarded.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let input: PageInput = serde_json::from_slice(bytes)
            .map_err(|e| Error::Validation(format!("invalid page JSON: {e}")))?;
        if input.metadata.modified.is_some() {
            tracing::debug!("ignoring client-supplied modified timestamp");
        }
        Ok(Self {
            contents: input.contents,
            title: input.metadata.title,
            tags: input.metadata.tags,
        })
    }

    /// Validate the title and clean up the tag list: empty tags are dropped
    /// and duplicates removed, keeping first-occurrence order.
    pub fn normalized(self) -> Result<Self> {
        if self.title.contains(['\n', '\r']) {
            return Err(Error::Validation(
                "page title must be a single line".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut tags = Vec::with_capacity(self.tags.len());
        for tag in self.tags {
            if tag.is_empty() {
                continue;
            }
            if tag.chars().any(char::is_control) {
                return Err(Error::Validation(format!(
                    "tag {tag:?} contains control characters"
                )));
            }
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }

        Ok(Self { tags, ..self })
    }

    pub fn into_page(self, modified: DateTime<Utc>) -> Page {
        Page {
            contents: self.contents,
            metadata: Metadata {
                title: self.title,
                tags: self.tags,
                modified,
            },
        }
    }
}

impl Page {
    /// The client-editable part of the page.
    pub fn to_update(&self) -> PageUpdate {
        PageUpdate {
            contents: self.contents.clone(),
            title: self.metadata.title.clone(),
            tags: self.metadata.tags.clone(),
        }
    }
}

/// Check that a slug can serve as a key in both stores and as a file name.
pub fn validate_slug(slug: &str) -> Result<()> {
    let problem = if slug.is_empty() {
        Some("must not be empty")
    } else if slug.len() > MAX_SLUG_LEN {
        Some("is too long")
    } else if slug.starts_with('.') {
        Some("must not start with '.'")
    } else if slug.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if slug.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match problem {
        Some(reason) => {
            Err(Error::Validation(format!("slug {slug:?} {reason}")))
        }
        None => Ok(()),
    }
}
