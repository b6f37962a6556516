//! CLI module - Command definitions and handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod add;
pub mod changes;
pub mod conflicts;
pub mod explain;
pub mod ingest;
pub mod init;
pub mod promote;
pub mod recall;
pub mod stats;
pub mod utils;

/// factkeep - fact resolution and recall
///
/// Keeps one consistent set of facts per project (plus a global set) and
/// answers questions about them.
#[derive(Parser, Debug)]
#[command(name = "factkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "FACTKEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root (default: nearest directory with .factkeep)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize factkeep in a project
    Init(init::InitArgs),

    /// Resolve a statement into the fact store
    Add(add::AddArgs),

    /// Store raw text for recall and citation
    Ingest(ingest::IngestArgs),

    /// Lexical recall
    Recall(recall::RecallArgs),

    /// Similarity recall
    Semantic(recall::SemanticArgs),

    /// Facts relevant to every one of several concepts
    Concepts(recall::ConceptsArgs),

    /// Show a fact with its receipts, history and conflicts
    Explain(explain::ExplainArgs),

    /// List open conflicts
    Conflicts(conflicts::ConflictsArgs),

    /// Facts created since a point in time
    Changes(changes::ChangesArgs),

    /// Copy a project fact into global scope
    Promote(promote::PromoteArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),
}
