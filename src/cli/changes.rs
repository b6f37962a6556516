//! `factkeep changes` command
//!
//! # Usage
//! ```bash
//! factkeep changes                                # newest facts, any status
//! factkeep changes --since 2024-05-01T00:00:00Z
//! factkeep changes --since 2024-05-01 --scope global
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;

use super::utils::{fact_line, print_json, Workspace};
use crate::core::fact::ScopeSelector;

#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Only facts created after this (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

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

pub fn run(args: ChangesArgs, ws: &Workspace) -> Result<()> {
    let since = args.since.as_deref().map(parse_since).transpose()?;
    let memory = ws.open_memory()?;
    let facts = memory.changes(
        since,
        ws.limit_or_default(args.limit),
        args.scope,
        &ws.scope_context(),
    )?;

    match args.format.as_str() {
        "json" => print_json(&facts)?,
        _ => {
            if facts.is_empty() {
                println!("No changes.");
            }
            for fact in &facts {
                println!(
                    "{}  {}",
                    fact.created_at.format("%Y-%m-%d %H:%M:%S"),
                    fact_line(fact)
                );
            }
        }
    }
    Ok(())
}

fn parse_since(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid --since: {s} (expected RFC 3339 or YYYY-MM-DD)"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}
