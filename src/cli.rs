//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use digest_hub::processing::DEFAULT_BATCH_SIZE;
use digest_hub::search::SearchMode;
use digest_hub::source::{Cadence, SourceKind};

/// Poll content sources on a schedule and search what they published.
///
/// Sources (RSS/Atom feeds, public Telegram channels) are fetched by
/// per-source loops; items are deduplicated by URL and indexed for hybrid
/// full-text + fuzzy search.
#[derive(Parser, Debug)]
#[command(name = "digest-hub")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/digest-hub/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file (overrides `database_path` from the config file)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every enabled source's polling loop until Ctrl-C
    Serve,
    /// Manage configured sources
    #[command(subcommand)]
    Source(SourceCommand),
    /// Fetch one source once, outside its schedule
    Fetch {
        /// Source id
        id: String,
    },
    /// Search stored content
    Search(SearchArgs),
    /// Import content items from a JSON file (array of items)
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Run the processing pipeline over unprocessed items
    Process {
        /// Maximum number of items to process
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        limit: u32,
    },
    /// List registered adapters and their required config
    Adapters {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Register a new source
    Add(SourceAddArgs),
    /// List sources
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one source as JSON
    Show {
        /// Source id
        id: String,
    },
    /// Change a source
    Update(SourceUpdateArgs),
    /// Delete a source (refused while it still has stored items, unless --purge)
    Remove {
        /// Source id
        id: String,

        /// Also delete every item the source has stored
        #[arg(long)]
        purge: bool,
    },
    /// Check that a source is reachable
    Test {
        /// Source id
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct SourceAddArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Adapter id (see `digest-hub adapters`)
    #[arg(long)]
    pub adapter: String,

    /// Source kind
    #[arg(long, value_parser = parse_source_kind, default_value = "rss")]
    pub kind: SourceKind,

    /// Polling cadence: realtime, 5min, 15min, 30min, hourly, daily, weekly, manual or e.g. 90s
    #[arg(long, value_parser = parse_cadence, default_value = "hourly")]
    pub cadence: Cadence,

    /// Adapter config entry, repeatable (e.g. --set url=https://example.com/feed.xml)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,

    /// Tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Explicit source id (derived from the name otherwise)
    #[arg(long)]
    pub id: Option<String>,

    /// Register without starting polling
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Args, Debug)]
pub struct SourceUpdateArgs {
    /// Source id
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, value_parser = parse_cadence)]
    pub cadence: Option<Cadence>,

    /// Adapter config entry to add or replace, repeatable
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,

    /// Replace tags, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    #[arg(long)]
    pub disable: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search text
    pub query: String,

    /// hybrid, lexical, fuzzy or substring
    #[arg(long, value_parser = parse_search_mode, default_value = "hybrid")]
    pub mode: SearchMode,

    /// Minimum trigram similarity for fuzzy candidates (default from config, else 0.3)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum number of results
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

fn parse_source_kind(raw: &str) -> Result<SourceKind, String> {
    raw.parse()
}

fn parse_cadence(raw: &str) -> Result<Cadence, String> {
    raw.parse()
}

fn parse_search_mode(raw: &str) -> Result<SearchMode, String> {
    raw.parse()
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got '{raw}'"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
