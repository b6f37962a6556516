//! `factkeep ingest` command
//!
//! Stores raw text (a message, a document excerpt) so `recall` can find it
//! and later `add --content <id>` calls can cite it.
//!
//! # Usage
//! ```bash
//! factkeep ingest "We moved the API to PostgreSQL last week"
//! factkeep ingest --file notes.md
//! factkeep ingest --scope global "I prefer tabs"
//! ```

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

use super::utils::{print_json, Workspace};
use crate::core::fact::Scope;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Text to store
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short = 'F', long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Scope the text belongs to
    #[arg(short, long, default_value = "project")]
    pub scope: Scope,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

pub fn run(args: IngestArgs, ws: &Workspace) -> Result<()> {
    let text = match (&args.text, &args.file) {
        (_, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        (Some(text), None) => text.clone(),
        (None, None) => bail!("Provide text or --file."),
    };

    let memory = ws.open_memory()?;
    let id = memory.ingest(&text, args.scope, &ws.scope_context())?;

    match args.format.as_str() {
        "json" => print_json(&serde_json::json!({ "content_item_id": id }))?,
        _ => println!("{} Stored content item {}", "✓".green(), id),
    }
    Ok(())
}
