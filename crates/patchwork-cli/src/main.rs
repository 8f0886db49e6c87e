mod cmd_branch;
mod cmd_config;
mod cmd_doc;
mod cmd_history;
mod cmd_init;
mod cmd_meta;
mod cmd_summarize;
mod workspace;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchwork", version, about = "Branching history for collaborative documents")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .patchwork/ workspace
    Init,
    /// Create a document and make it current
    New {
        /// Initial content
        #[arg(long)]
        content: Option<String>,
    },
    /// Switch the current document
    Use {
        /// Document URL
        url: String,
    },
    /// Replace the current document's content
    Write {
        text: String,
    },
    /// Append text to the current document
    Append {
        text: String,
    },
    /// Delete and insert text at a character index
    Splice {
        index: usize,
        delete: usize,
        #[arg(default_value = "")]
        text: String,
    },
    /// Branch operations
    Branch {
        #[command(subcommand)]
        cmd: cmd_branch::BranchCmd,
    },
    /// Tag the current heads
    Tag {
        name: String,
    },
    /// Start a discussion, or reply to one
    Comment {
        text: String,
        /// Discussion to reply to
        #[arg(long)]
        reply: Option<String>,
        /// Anchor a new discussion to a character range, FROM..TO
        #[arg(long)]
        range: Option<String>,
    },
    /// Resolve a discussion
    Resolve {
        /// Discussion id
        id: String,
    },
    /// Show the grouped history of the current document
    History {
        /// Grouping preset (e.g. by-author, by-edit-time, tags-only)
        #[arg(long)]
        grouping: Option<String>,
        /// Batch size for count-based presets
        #[arg(long)]
        batch_size: Option<usize>,
        /// Gap that splits time-based groups
        #[arg(long)]
        max_gap_minutes: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Include history hidden behind the branch origin
        #[arg(long)]
        all: bool,
    },
    /// Write AI summaries for change groups
    Summarize {
        /// Replace existing summaries
        #[arg(long)]
        force: bool,
    },
    /// Manage workspace configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PATCHWORK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => cmd_init::execute(&repo_root),
        Command::New { content } => cmd_doc::new(&repo_root, content.as_deref()),
        Command::Use { url } => cmd_doc::switch(&repo_root, &url),
        Command::Write { text } => cmd_doc::write(&repo_root, &text),
        Command::Append { text } => cmd_doc::append(&repo_root, &text),
        Command::Splice {
            index,
            delete,
            text,
        } => cmd_doc::splice(&repo_root, index, delete, &text),
        Command::Branch { cmd } => cmd_branch::run(cmd, &repo_root),
        Command::Tag { name } => cmd_meta::tag(&repo_root, &name),
        Command::Comment { text, reply, range } => {
            cmd_meta::comment(&repo_root, &text, reply.as_deref(), range.as_deref())
        }
        Command::Resolve { id } => cmd_meta::resolve(&repo_root, &id),
        Command::History {
            grouping,
            batch_size,
            max_gap_minutes,
            json,
            all,
        } => cmd_history::execute(cmd_history::HistoryParams {
            repo_root: &repo_root,
            grouping: grouping.as_deref(),
            batch_size,
            max_gap_minutes,
            json,
            all,
        }),
        Command::Summarize { force } => cmd_summarize::execute(&repo_root, force),
        Command::Config { cmd } => cmd_config::run(cmd, &repo_root),
    }
}
