//! CLI utility functions
//!
//! Common helpers shared across CLI commands:
//! - Project discovery (walks up to the nearest `.factkeep`, like git)
//! - Opening [`Memory`] from config
//! - Output rendering shared by recall-style commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use ulid::Ulid;

use crate::config::{find_project_root, Config, StoreMode};
use crate::core::fact::{Fact, FactBundle, ScopeContext, Status};
use crate::core::memory::Memory;
use crate::core::ranking::Hit;
use crate::core::recall::{Backend, RecallEngine};
use crate::core::retry::Retrier;
use crate::core::storage::Storage;

/// Config plus the project the command runs in
#[derive(Debug)]
pub struct Workspace {
    pub config: Config,
    /// Directory holding `.factkeep`, if any
    pub root: Option<PathBuf>,
}

impl Workspace {
    /// `project` (the `--project` flag) wins over walking up from the
    /// working directory.
    pub fn discover(config_path: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let root = match project {
            Some(path) => Some(
                path.canonicalize()
                    .with_context(|| format!("project path {}", path.display()))?,
            ),
            None => find_project_root(&std::env::current_dir()?),
        };
        Ok(Self { config, root })
    }

    pub fn scope_context(&self) -> ScopeContext {
        match &self.root {
            Some(root) => ScopeContext::new(root.to_string_lossy()),
            None => ScopeContext::global_only(),
        }
    }

    /// Open both stores as configured.
    ///
    /// Outside a project (and without an explicit project db) the project
    /// side is an empty in-memory store.
    pub fn open_memory(&self) -> Result<Memory> {
        let timeout = self.config.busy_timeout();
        let global_path = self.config.global_db_path()?;
        let backend = match self.config.store.mode {
            StoreMode::Single => Backend::open_single(&global_path, timeout)
                .with_context(|| format!("opening {}", global_path.display()))?,
            StoreMode::Dual => {
                let project = match self.project_db_path() {
                    Some(path) => Storage::open_with_timeout(&path, timeout)
                        .with_context(|| format!("opening {}", path.display()))?,
                    None => Storage::open_memory()?,
                };
                let global = Storage::open_with_timeout(&global_path, timeout)
                    .with_context(|| format!("opening {}", global_path.display()))?;
                Backend::Dual { project, global }
            }
        };
        tracing::debug!(mode = ?self.config.store.mode, global = %global_path.display(), "opened stores");

        let engine = RecallEngine::new(
            backend,
            Box::new(self.config.embedder()),
            self.config.recall_settings(),
        );
        Ok(Memory::new(
            engine,
            self.config.resolver(),
            Retrier::new(self.config.retry_policy()),
        ))
    }

    fn project_db_path(&self) -> Option<PathBuf> {
        match &self.root {
            Some(root) => Some(self.config.project_db_path(root)),
            None => self.config.store.project_db.clone(),
        }
    }

    pub fn limit_or_default(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.config.recall.default_limit)
    }
}

/// Parse a fact id, accepting lowercase ULIDs.
pub fn parse_id(s: &str) -> Result<Ulid> {
    Ulid::from_string(&s.trim().to_uppercase()).with_context(|| format!("invalid fact id: {s}"))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One colored line for a fact.
pub fn fact_line(fact: &Fact) -> String {
    let status = match fact.status {
        Status::Active => fact.status.as_str().green(),
        Status::Disputed => fact.status.as_str().red(),
        Status::Proposed => fact.status.as_str().yellow(),
        _ => fact.status.as_str().dimmed(),
    };
    let predicate = match fact.polarity {
        crate::core::fact::Polarity::Positive => fact.predicate.clone(),
        crate::core::fact::Polarity::Negative => format!("NOT {}", fact.predicate),
    };
    format!(
        "{} {} {} {} {} [{}, {}]",
        fact.short_id().dimmed(),
        fact.subject.as_deref().unwrap_or("-").cyan().bold(),
        predicate,
        "=".dimmed(),
        fact.object_literal.bold(),
        status,
        fact.scope
    )
}

pub fn print_bundles(bundles: &[FactBundle]) {
    if bundles.is_empty() {
        println!("No results found.");
        return;
    }
    for (i, bundle) in bundles.iter().enumerate() {
        println!("{}. {}", i + 1, fact_line(&bundle.fact));
        if let Some(receipt) = bundle.receipts.first() {
            println!("   {} {}", ">".dimmed(), receipt.quote.italic());
        }
    }
}

pub fn print_hits(hits: &[Hit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {}",
            i + 1,
            fact_line(&hit.bundle.fact),
            format!("({:.3}, {})", hit.score, hit.origin).dimmed()
        );
    }
}
