//! wikipad - a personal wiki with full-text search.
//!
//! Pages live in a transactional [redb](https://github.com/cberner/redb)
//! record store, which is the source of truth. A
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index is kept in step
//! with it for free-text search and tag counts, and can always be rebuilt
//! from the store.
//!
//! # Quick start
//!
//! ```no_run
//! use wikipad::{Config, DataDir, PageUpdate, SearchRequest, Wiki};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config = Config::load(&data_dir.config_file()).unwrap();
//! let wiki = Wiki::open(&data_dir, &config).unwrap();
//!
//! wiki.put_page(
//!     "rust",
//!     PageUpdate::new("Rust is a systems language.", "Rust", ["lang"]),
//! )
//! .unwrap();
//!
//! let results = wiki
//!     .search(&SearchRequest::new("systems").with_tag("lang"))
//!     .unwrap();
//! for hit in &results.hits {
//!     println!("{} (score: {:.3})", hit.id, hit.score);
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod data_dir;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod output;
pub mod page;
pub mod projector;
pub mod query;
pub mod record_store;
pub mod search_index;
pub mod sync;
pub mod text_util;
pub mod user;
pub mod walker;
pub mod wiki;

pub use config::Config;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use page::{Metadata, Page, PageUpdate};
pub use projector::Projector;
pub use query::{SearchParams, SearchRequest, SearchResults};
pub use record_store::{Collection, RecordStore};
pub use search_index::SearchIndex;
pub use user::User;
pub use wiki::Wiki;
