use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::query::SearchParams;

#[derive(Debug, Parser)]
#[command(
    name = "wikipad",
    about = "A personal wiki with full-text search over Markdown pages"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read and write pages
    Page {
        #[command(subcommand)]
        action: PageAction,
    },
    /// Search page titles, contents and tags
    Search(SearchArgs),
    /// List every tag with its page count
    Tags(TagsArgs),
    /// List the pages carrying a tag
    Tag(TagArgs),
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Rebuild the search index from stored pages
    Reindex,
    /// Compare stored pages with the search index
    Check(CheckArgs),
    /// Load a directory of <slug>.md files into the wiki
    Import(DirArgs),
    /// Write every page to a directory as <slug>.md files
    Export(DirArgs),
    /// Keep the wiki in step with a directory of page files
    Sync(SyncArgs),
    /// Show page, user and index counts
    Status(JsonArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Page subcommands --

#[derive(Debug, Subcommand)]
pub enum PageAction {
    /// Print a page
    Get {
        slug: String,
        /// Output as JSON
        #[arg(long, conflicts_with = "raw")]
        json: bool,
        /// Output in the on-disk format (header block + body)
        #[arg(long)]
        raw: bool,
    },
    /// Create or replace a page
    Put(PutArgs),
    /// Delete a page
    Delete { slug: String },
    /// Move a page to a new slug
    Rename { old: String, new: String },
    /// List page slugs
    List {
        /// Only slugs matching this glob pattern
        #[arg(long)]
        glob: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Parser)]
pub struct PutArgs {
    pub slug: String,

    /// Read the page from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Input is page JSON ({"contents", "metadata": {"title", "tags"}})
    /// rather than the on-disk format
    #[arg(long)]
    pub json: bool,

    /// Set the title, overriding the input
    #[arg(long)]
    pub title: Option<String>,

    /// Set the tags (repeatable), overriding the input
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query (empty matches every page)
    #[arg(default_value = "")]
    pub query: String,

    /// Only pages with this tag (repeatable, all must match)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Number of hits to skip
    #[arg(long)]
    pub from: Option<String>,

    /// Number of hits to return
    #[arg(short = 'n', long)]
    pub size: Option<String>,

    /// Sort key: title, modified, id or _score; prefix with '-' to reverse
    /// (repeatable)
    #[arg(short, long, allow_hyphen_values = true)]
    pub sort: Vec<String>,

    /// Also report up to this many tag counts for the matches
    #[arg(long)]
    pub facets: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    /// The raw parameters, validated later like any other caller's.
    pub fn params(&self) -> SearchParams {
        SearchParams {
            q: Some(self.query.clone()),
            tag: self.tags.clone(),
            from: self.from.clone(),
            size: self.size.clone(),
            sort: self.sort.clone(),
            facets: self.facets.clone(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct TagsArgs {
    /// Maximum number of tags to list
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TagArgs {
    pub tag: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- User subcommands --

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create a user
    Add {
        username: String,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Change a user's password
    Passwd {
        username: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Delete a user
    Remove { username: String },
    /// List users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a username and password
    Verify {
        username: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
}

#[derive(Debug, Parser)]
pub struct PasswordArgs {
    /// Password (read from the first line of stdin if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

// -- Maintenance --

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Rebuild the index if it has drifted
    #[arg(long)]
    pub repair: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct DirArgs {
    /// Page directory (default: wiki_dir from the configuration)
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct SyncArgs {
    /// Page directory (default: wiki_dir from the configuration)
    pub dir: Option<PathBuf>,

    /// Seconds between scans (default: sync_interval_secs)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Scan once and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Parser)]
pub struct JsonArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "wikipad",
            &mut std::io::stdout(),
        );
    }
}
