//! DWords CLI
//!
//! Command-line shell over the vocabulary store: plans, words, dictionary
//! lookups, settings, and sync batches.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use dwords_core::{WordList, WordStatus};

#[derive(Parser)]
#[command(name = "dwords")]
#[command(author, version, about = "DWords: local-first vocabulary plans")]
struct Cli {
    /// Config file (default: <config dir>/dwords/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User database, overriding the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list, rename, delete and select plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },

    /// Manage words in a plan
    Word {
        #[command(subcommand)]
        command: WordCommands,
    },

    /// Query the reference dictionary
    Dict {
        #[command(subcommand)]
        command: DictCommands,
    },

    /// Read and write user settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Exchange change batches with another replica
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a plan, optionally seeded from the dictionary or a CSV file
    New {
        name: String,
        /// Seed with dictionary entries whose tag contains TAG
        #[arg(long, conflicts_with = "import")]
        tag: Option<String>,
        /// Dictionary for --tag (default: the active dictionary setting)
        #[arg(long, requires = "tag")]
        dictionary: Option<String>,
        /// Column ranking --tag entries
        #[arg(long, default_value = "frq")]
        order: String,
        /// Seed from a CSV file of `word,paraphrase` rows
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// List live plans
    List,
    /// Rename a plan
    Rename { id: Uuid, name: String },
    /// Delete a plan and its words
    Delete { id: Uuid },
    /// Make a plan current
    Select {
        #[arg(required_unless_present = "none")]
        id: Option<Uuid>,
        /// Clear the selection
        #[arg(long, conflicts_with = "id")]
        none: bool,
    },
    /// Show the current plan
    Current,
}

#[derive(Args)]
struct PlanArg {
    /// Plan id (default: the current plan)
    #[arg(long)]
    plan: Option<Uuid>,
}

#[derive(Subcommand)]
enum WordCommands {
    /// Add a word
    Add {
        word: String,
        #[arg(long, default_value = "")]
        paraphrase: String,
        /// Sort position (default: after the last word)
        #[arg(long)]
        time: Option<i64>,
        #[command(flatten)]
        plan: PlanArg,
    },
    /// List words in one lifecycle view
    List {
        #[arg(long, value_enum, default_value_t = ViewArg::Current)]
        view: ViewArg,
        /// Window size (default: the maxCurrent setting)
        #[arg(long)]
        max_current: Option<u32>,
        #[command(flatten)]
        plan: PlanArg,
    },
    /// Show one word, tombstoned or not
    Show {
        word: String,
        #[command(flatten)]
        plan: PlanArg,
    },
    /// Update fields of a word; --rename changes its identity
    Update {
        word: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        time: Option<i64>,
        #[arg(long)]
        paraphrase: Option<String>,
        #[arg(long)]
        show_paraphrase: Option<bool>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[command(flatten)]
        plan: PlanArg,
    },
    /// Delete a word (leaves a tombstone)
    Delete {
        word: String,
        #[command(flatten)]
        plan: PlanArg,
    },
    /// Remove a word's tombstone so the identity can be reused
    Purge {
        word: String,
        #[command(flatten)]
        plan: PlanArg,
    },
}

#[derive(Subcommand)]
enum DictCommands {
    /// Paraphrase of a word
    Lookup {
        word: String,
        #[arg(long)]
        dictionary: Option<String>,
    },
    /// Words starting with a prefix
    Search {
        prefix: String,
        #[arg(long)]
        dictionary: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print a setting (falls back to the configured default)
    Get { key: String },
    /// Store a setting; VALUE is JSON, bare words are taken as strings
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Write records newer than a version as a JSON batch
    Export {
        #[arg(long, default_value_t = 0)]
        since: i64,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Merge a JSON batch into the local store
    Apply {
        /// Input file (default: stdin)
        input: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Current,
    Planning,
    Memorized,
    All,
}

impl From<ViewArg> for WordList {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Current => WordList::Current,
            ViewArg::Planning => WordList::Planning,
            ViewArg::Memorized => WordList::Memorized,
            ViewArg::All => WordList::All,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Memorized,
}

impl From<StatusArg> for WordStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Active => WordStatus::Active,
            StatusArg::Memorized => WordStatus::Memorized,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dwords_core=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
