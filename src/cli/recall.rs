//! `factkeep recall`, `factkeep semantic` and `factkeep concepts` commands
//!
//! # Usage
//! ```bash
//! factkeep recall "database"                     # lexical, project then global
//! factkeep recall "tabs" --scope global
//! factkeep semantic "which database do we use"   # embedding similarity
//! factkeep semantic "postgres" --mode both
//! factkeep concepts authentication jwt           # facts about all concepts
//! ```
//!
//! Project facts always rank ahead of global facts; duplicates across
//! scopes collapse onto the project copy.

use anyhow::Result;
use clap::Args;

use super::utils::{print_bundles, print_hits, print_json, Workspace};
use crate::core::fact::ScopeSelector;
use crate::core::recall::SemanticMode;

#[derive(Args, Debug)]
pub struct RecallArgs {
    /// Search text
    pub query: String,

    /// Maximum results (default from config)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Scopes to read (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct SemanticArgs {
    /// Text to compare against
    pub query: String,

    /// vector, text or both
    #[arg(short, long, default_value = "vector")]
    pub mode: SemanticMode,

    /// Maximum results (default from config)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Scopes to read (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct ConceptsArgs {
    /// Two to five concepts; results must relate to each
    #[arg(required = true)]
    pub concepts: Vec<String>,

    /// Maximum results (default from config)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Scopes to read (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

pub fn run_recall(args: RecallArgs, ws: &Workspace) -> Result<()> {
    let memory = ws.open_memory()?;
    let bundles = memory.recall(
        &args.query,
        ws.limit_or_default(args.limit),
        args.scope,
        &ws.scope_context(),
    )?;

    match args.format.as_str() {
        "json" => print_json(&bundles)?,
        _ => print_bundles(&bundles),
    }
    Ok(())
}

pub fn run_semantic(args: SemanticArgs, ws: &Workspace) -> Result<()> {
    let memory = ws.open_memory()?;
    let hits = memory.recall_semantic(
        &args.query,
        ws.limit_or_default(args.limit),
        args.scope,
        args.mode,
        &ws.scope_context(),
    )?;

    match args.format.as_str() {
        "json" => print_json(&hits)?,
        _ => print_hits(&hits),
    }
    Ok(())
}

pub fn run_concepts(args: ConceptsArgs, ws: &Workspace) -> Result<()> {
    let memory = ws.open_memory()?;
    let hits = memory.recall_concepts(
        args.concepts.as_slice(),
        ws.limit_or_default(args.limit),
        args.scope,
        &ws.scope_context(),
    )?;

    match args.format.as_str() {
        "json" => print_json(&hits)?,
        _ => print_hits(&hits),
    }
    Ok(())
}
