use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("search index unavailable: {0}")]
    IndexBusy(String),

    #[error(
        "search index has drifted from the record store \
         ({missing} missing, {orphaned} orphaned)"
    )]
    Drift { missing: usize, orphaned: usize },

    #[error(
        "page '{slug}' was saved but the search index is stale: {source}"
    )]
    IndexStale {
        slug: String,
        #[source]
        source: Box<Error>,
    },

    #[error("malformed page header: {0}")]
    MalformedHeader(#[from] toml::de::Error),

    #[error("malformed page header: missing closing marker")]
    UnterminatedHeader,

    #[error("page header encoding error: {0}")]
    HeaderEncoding(#[from] toml::ser::Error),

    #[error("record encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    Conflict { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

/// The subsystem an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Store,
    Index,
    Codec,
    Input,
    Credential,
    Environment,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::Store => "store",
            Layer::Index => "index",
            Layer::Codec => "codec",
            Layer::Input => "input",
            Layer::Credential => "credential",
            Layer::Environment => "environment",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Error::Conflict {
            kind,
            name: name.into(),
        }
    }

    /// Classify the error by the layer that failed.
    ///
    /// A partial failure reports [`Layer::Index`]: the record store write
    /// went through and only the projection is missing.
    pub fn layer(&self) -> Layer {
        match self {
            Error::Redb(_)
            | Error::RedbStorage(_)
            | Error::RedbTransaction(_)
            | Error::RedbTable(_)
            | Error::RedbCommit(_)
            | Error::StoreUnavailable(_)
            | Error::Serialization(_)
            | Error::NotFound { .. }
            | Error::Conflict { .. } => Layer::Store,
            Error::Index(_)
            | Error::IndexBusy(_)
            | Error::IndexStale { .. }
            | Error::Drift { .. } => Layer::Index,
            Error::MalformedHeader(_)
            | Error::UnterminatedHeader
            | Error::HeaderEncoding(_) => Layer::Codec,
            Error::Validation(_) => Layer::Input,
            Error::Credential(_) => Layer::Credential,
            Error::Io(_) | Error::Config(_) | Error::DataDir(_) => {
                Layer::Environment
            }
        }
    }

    /// True when the record store holds the new state but the search index
    /// does not reflect it yet.
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::IndexStale { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Wrap an index-side failure that happened after a durable store write.
    pub(crate) fn stale(slug: &str, source: Error) -> Self {
        Error::IndexStale {
            slug: slug.to_string(),
            source: Box::new(source),
        }
    }
}
