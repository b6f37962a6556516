//! `factkeep conflicts` command
//!
//! Lists open conflicts: exclusive slots where a newcomer contradicted the
//! active value without saying it replaced it.
//!
//! # Usage
//! ```bash
//! factkeep conflicts
//! factkeep conflicts --scope project --format json
//! ```

use anyhow::Result;
use clap::Args;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::utils::{print_json, Workspace};
use crate::core::fact::{Fact, ScopeSelector};
use crate::core::recall::ConflictView;

#[derive(Args, Debug)]
pub struct ConflictsArgs {
    /// Scopes to read (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "Conflict")]
    id: String,
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Held")]
    held: String,
    #[tabled(rename = "Contradicted by")]
    newcomer: String,
    #[tabled(rename = "Detected")]
    detected: String,
}

impl From<&ConflictView> for ConflictRow {
    fn from(view: &ConflictView) -> Self {
        Self {
            id: view.conflict.short_id(),
            slot: format!(
                "{} {}",
                view.fact_a.subject.as_deref().unwrap_or("-"),
                view.fact_a.predicate
            ),
            held: side(&view.fact_a),
            newcomer: side(&view.fact_b),
            detected: view.conflict.detected_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn side(fact: &Fact) -> String {
    format!("{} ({}, {})", fact.object_literal, fact.short_id(), fact.status)
}

pub fn run(args: ConflictsArgs, ws: &Workspace) -> Result<()> {
    let memory = ws.open_memory()?;
    let views = memory.conflicts(args.scope, &ws.scope_context())?;

    match args.format.as_str() {
        "json" => print_json(&views)?,
        _ => {
            if views.is_empty() {
                println!("No open conflicts.");
                return Ok(());
            }
            let rows: Vec<ConflictRow> = views.iter().map(ConflictRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }
    Ok(())
}
