//! Stats command - Show store statistics per scope

use clap::Args;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::utils::{print_json, Workspace};
use crate::core::fact::ScopeSelector;

/// Stats command arguments
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Scopes to report (project, global, all)
    #[arg(short, long, default_value = "all")]
    pub scope: ScopeSelector,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Active")]
    active: usize,
    #[tabled(rename = "Disputed")]
    disputed: usize,
    #[tabled(rename = "Proposed")]
    proposed: usize,
    #[tabled(rename = "Retired")]
    retired: usize,
    #[tabled(rename = "Open conflicts")]
    conflicts: usize,
}

/// Execute stats command
pub fn execute(args: StatsArgs, ws: &Workspace) -> anyhow::Result<()> {
    let memory = ws.open_memory()?;
    let stats = memory.stats(args.scope, &ws.scope_context())?;

    if args.json {
        let json: Vec<_> = stats
            .iter()
            .map(|(filter, s)| serde_json::json!({ "source": filter, "stats": s }))
            .collect();
        return print_json(&json);
    }

    let rows: Vec<StatsRow> = stats
        .iter()
        .map(|(filter, s)| StatsRow {
            scope: filter.scope.to_string(),
            total: s.total_facts,
            active: s.active_facts,
            disputed: s.disputed_facts,
            proposed: s.proposed_facts,
            retired: s.retired_facts,
            conflicts: s.open_conflicts,
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if let Some(root) = &ws.root {
        println!("\nProject: {}", root.display());
    }
    println!("Global store: {}", ws.config.global_db_path()?.display());
    Ok(())
}
