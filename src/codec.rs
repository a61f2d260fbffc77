//! On-disk page format: a TOML header block between marker lines, followed
//! by the raw Markdown body.
//!
//! ```text
//! <!-- wikipad header
//! title = "Hello"
//! tags = ["draft"]
//! -->
//!
//! # Hello
//! ```
//!
//! # Examples
//!
//! ```
//! use wikipad::{codec, PageUpdate};
//!
//! let page = PageUpdate::new("# Hello\n", "Hello", ["draft"]);
//! let text = codec::encode(&page).unwrap();
//! assert_eq!(codec::decode(&text).unwrap(), page);
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    page::PageUpdate,
};

/// First line of a header block.
pub const OPEN_MARKER: &str = "<!-- wikipad header";

/// Line that ends a header block.
pub const CLOSE_MARKER: &str = "-->";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PageHeader {
    title: String,
    tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    BeforeHeader,
    InHeader,
    AfterHeader,
    InBody,
}

/// Serialize a page into its single-file representation.
///
/// Titles and tags must not contain line breaks.
pub fn encode(page: &PageUpdate) -> Result<String> {
    let has_line_break = |s: &str| s.contains(['\n', '\r']);
    if has_line_break(page.title.as_str())
        || page.tags.iter().any(|t| has_line_break(t.as_str()))
    {
        return Err(Error::Validation(
            "page title and tags must not contain line breaks".to_string(),
        ));
    }

    let header = toml::to_string(&PageHeader {
        title: page.title.clone(),
        tags: page.tags.clone(),
    })?;

    let mut out = String::with_capacity(
        OPEN_MARKER.len() + header.len() + page.contents.len() + 8,
    );
    out.push_str(OPEN_MARKER);
    out.push('\n');
    out.push_str(&header);
    if !header.is_empty() && !header.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(CLOSE_MARKER);
    out.push_str("\n\n");
    out.push_str(&page.contents);
    Ok(out)
}

/// Parse a page from its single-file representation.
///
/// Text that does not open with [`OPEN_MARKER`] is all body. After the
/// closing marker, one blank separator line is skipped if present; the
/// remaining bytes are the body, untouched.
pub fn decode(text: &str) -> Result<PageUpdate> {
    let mut state = ScanState::BeforeHeader;
    let mut header = String::new();
    let mut body_start = text.len();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let bare = strip_line_ending(line);
        match state {
            ScanState::BeforeHeader => {
                if bare == OPEN_MARKER {
                    state = ScanState::InHeader;
                } else {
                    body_start = 0;
                    state = ScanState::InBody;
                }
            }
            ScanState::InHeader => {
                if bare == CLOSE_MARKER {
                    state = ScanState::AfterHeader;
                } else {
                    header.push_str(line);
                }
            }
            ScanState::AfterHeader => {
                body_start = if bare.is_empty() {
                    offset + line.len()
                } else {
                    offset
                };
                state = ScanState::InBody;
            }
            ScanState::InBody => {}
        }
        if state == ScanState::InBody {
            break;
        }
        offset += line.len();
    }

    let header: PageHeader = match state {
        ScanState::BeforeHeader => PageHeader::default(),
        ScanState::InHeader => return Err(Error::UnterminatedHeader),
        ScanState::AfterHeader | ScanState::InBody if body_start == 0 => {
            PageHeader::default()
        }
        ScanState::AfterHeader | ScanState::InBody => toml::from_str(&header)?,
    };

    Ok(PageUpdate {
        contents: text[body_start..].to_string(),
        title: header.title,
        tags: header.tags,
    })
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
