//! `factkeep explain` command
//!
//! Shows one fact with everything that justifies it: receipts, the facts it
//! replaced, the facts that replaced it and any conflicts it is part of.
//!
//! # Usage
//! ```bash
//! factkeep explain 01J9ZK3M7Q...
//! factkeep explain 01J9ZK3M7Q... --format json
//! ```

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::utils::{fact_line, parse_id, print_json, Workspace};
use crate::core::fact::ScopeSelector;
use crate::core::recall::Explanation;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Fact id (ULID)
    pub id: String,

    /// Scopes to look in (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

pub fn run(args: ExplainArgs, ws: &Workspace) -> Result<()> {
    let id = parse_id(&args.id)?;
    let memory = ws.open_memory()?;

    let Some(explanation) = memory.explain(&id, args.scope, &ws.scope_context())? else {
        bail!("Fact not found: {}", args.id);
    };

    match args.format.as_str() {
        "json" => print_json(&explanation)?,
        _ => print_pretty(&explanation),
    }
    Ok(())
}

fn print_pretty(e: &Explanation) {
    println!("{}", fact_line(&e.fact));
    println!(
        "   id: {}  confidence: {:.2}  valid from: {}",
        e.fact.id,
        e.fact.confidence,
        e.fact.valid_from.to_rfc3339()
    );
    if let Some(to) = e.fact.valid_to {
        println!("   valid to: {}", to.to_rfc3339());
    }
    if let Some(path) = &e.fact.project_path {
        println!("   project: {}", path);
    }

    println!("\n{}", "Receipts".bold());
    if e.receipts.is_empty() {
        println!("   (none)");
    }
    for r in &e.receipts {
        println!("   {} \"{}\" [{}]", ">".dimmed(), r.quote, r.strength.as_str());
    }

    if !e.supersedes.is_empty() {
        println!("\n{}", "Supersedes".bold());
        for fact in &e.supersedes {
            println!("   {}", fact_line(fact));
        }
    }
    if !e.superseded_by.is_empty() {
        println!("\n{}", "Superseded by".bold());
        for fact in &e.superseded_by {
            println!("   {}", fact_line(fact));
        }
    }
    if !e.conflicts.is_empty() {
        println!("\n{}", "Conflicts".bold());
        for c in &e.conflicts {
            let other = if c.fact_a_id == e.fact.id {
                c.fact_b_id
            } else {
                c.fact_a_id
            };
            println!("   {} {} with {}", c.id, c.status.as_str(), other);
        }
    }
}
