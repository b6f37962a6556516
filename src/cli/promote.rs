//! `factkeep promote` command
//!
//! Copies an active project fact, with its receipts, into global scope so
//! other projects see it too. The copy is resolved against the global slot,
//! so promoting a value the global store already holds is a no-op.
//!
//! # Usage
//! ```bash
//! factkeep promote 01J9ZK3M7Q...
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::utils::{parse_id, print_json, Workspace};
use crate::core::resolver::Action;

#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Project fact id (ULID)
    pub id: String,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

pub fn run(args: PromoteArgs, ws: &Workspace) -> Result<()> {
    let id = parse_id(&args.id)?;
    let memory = ws.open_memory()?;
    let outcome = memory.promote(&id, &ws.scope_context())?;

    match args.format.as_str() {
        "json" => print_json(&outcome)?,
        _ => match outcome.action {
            Action::Equivalent => {
                println!("{} Already global as {}", "✓".green(), outcome.fact_id)
            }
            Action::Conflict => println!(
                "{} Promoted as {} but it conflicts with the global value (conflict {})",
                "!".yellow().bold(),
                outcome.fact_id,
                outcome
                    .conflict_id
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            _ => println!("{} Promoted to global as {}", "✓".green(), outcome.fact_id),
        },
    }
    Ok(())
}
