use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rite",
    about = "Rite: transactional file mutations with undo",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Project root.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub root: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the rite lineage from HEAD
    History(HistoryArgs),
    /// Reverse the most recent rites
    Undo(UndoArgs),
    /// Show path changes between two rites
    Diff(DiffArgs),
    /// Show one rite and its ledger
    Show(ShowArgs),
    /// Forge the reverse patch of a rite
    RevertPatch(PatchArgs),
    /// Apply a reverse patch as a new rite
    ApplyPatch(ApplyPatchArgs),
    /// Forge a cherry-pick blueprint of a rite
    CherryPick(PatchArgs),
    /// Inspect or restore soft-deleted bodies
    Trash(TrashArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct UndoArgs {
    /// Number of rites to reverse.
    #[arg(default_value = "1")]
    pub steps: usize,
    /// Skip rites without a ledger and continue past failed entries.
    #[arg(long)]
    pub force: bool,
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Newer rite (id prefix, HEAD or HEAD~N).
    pub newer: String,
    /// Baseline rite.
    #[arg(default_value = "HEAD~1")]
    pub baseline: String,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(default_value = "HEAD")]
    pub rite: String,
    /// Include line-level content diffs.
    #[arg(short, long)]
    pub patch: bool,
}

#[derive(Args)]
pub struct PatchArgs {
    #[arg(default_value = "HEAD")]
    pub rite: String,
    /// Write to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct ApplyPatchArgs {
    pub file: String,
}

#[derive(Args)]
pub struct TrashArgs {
    #[command(subcommand)]
    pub action: TrashAction,
}

#[derive(Subcommand)]
pub enum TrashAction {
    /// List the bodies a rite relocated
    List {
        #[arg(default_value = "HEAD")]
        rite: String,
    },
    /// Move trashed bodies back to their original paths
    Restore {
        rite: String,
        /// Only restore this original path.
        path: Option<String>,
    },
}

#[derive(Args)]
pub struct ConfigArgs {}
