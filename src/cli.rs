use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "feedvault",
    about = "Catalog, search and mirror files discovered in a content feed"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream the source feed into the catalog from the last checkpoint
    Index,
    /// Mirror qualifying catalog entries into the target feed
    Forward(ForwardArgs),
    /// Ranked search over the catalog
    Search(SearchArgs),
    /// Count catalog entries matching a query
    Count(CountArgs),
    /// Manage the promotional text appended to mirror captions
    Ad {
        #[command(subcommand)]
        action: AdAction,
    },
    /// Show catalog and pipeline status
    Status(StatusArgs),
    /// Administrative reset of durable state
    Reset(ResetArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Forward --

#[derive(Debug, Parser)]
pub struct ForwardArgs {
    /// Override the maximum payload size in bytes
    #[arg(long)]
    pub max_bytes: Option<u64>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Number of ranked results to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Count --

#[derive(Debug, Parser)]
pub struct CountArgs {
    /// The search query
    pub query: String,
}

// -- Ad text --

#[derive(Debug, Subcommand)]
pub enum AdAction {
    /// Print the stored ad text
    Get,
    /// Replace the stored ad text
    Set {
        /// Free-text value appended to mirror captions
        value: String,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Reset --

#[derive(Debug, Parser)]
pub struct ResetArgs {
    /// Clear indexer checkpoints so the next run starts from the beginning
    #[arg(long)]
    pub index_progress: bool,

    /// Clear forward records so settled items become pending again
    #[arg(long)]
    pub forward_history: bool,

    /// Delete every catalog entry
    #[arg(long)]
    pub catalog: bool,

    /// Skip the interactive confirmation
    #[arg(long)]
    pub yes: bool,
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
            "feedvault",
            &mut std::io::stdout(),
        );
    }
}
