//! `factkeep add` command
//!
//! Resolves one statement (or a batch of extracted candidates) against the
//! store. Prints what the resolver decided.
//!
//! # Usage
//! ```bash
//! factkeep add project uses_database MySQL --quote "we use MySQL"
//! factkeep add project uses_database PostgreSQL --quote "migrated to PostgreSQL" --supersedes
//! factkeep add Alice likes tea --negative --confidence 0.4 --quote "Alice hates tea"
//! factkeep add --batch candidates.json      # JSON array of candidates
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::utils::{parse_id, print_json, Workspace};
use crate::core::fact::{Polarity, Scope, Strength};
use crate::core::resolver::{Action, Candidate, ResolveOutcome, DEFAULT_SUBJECT_TYPE};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Subject of the statement
    #[arg(required_unless_present = "batch")]
    pub subject: Option<String>,

    /// Predicate (e.g. uses_database, works_at)
    #[arg(required_unless_present = "batch")]
    pub predicate: Option<String>,

    /// Object value
    #[arg(required_unless_present = "batch")]
    pub object: Option<String>,

    /// Entity type of the subject
    #[arg(long, default_value = DEFAULT_SUBJECT_TYPE)]
    pub subject_type: String,

    /// Register the object as an entity of this type
    #[arg(long)]
    pub object_type: Option<String>,

    /// The statement is negated
    #[arg(long)]
    pub negative: bool,

    /// Extractor confidence (0.0-1.0)
    #[arg(long, default_value = "0.9")]
    pub confidence: f32,

    /// Source text the statement was taken from
    #[arg(short, long)]
    pub quote: Option<String>,

    /// Cite an ingested content item instead of a quote
    #[arg(long)]
    pub content: Option<String>,

    /// stated or inferred
    #[arg(long, default_value = "stated")]
    pub strength: Strength,

    /// The source says this replaces the previous value
    #[arg(long)]
    pub supersedes: bool,

    /// Scope to write to (project or global)
    #[arg(short, long, default_value = "project")]
    pub scope: Scope,

    /// Read a JSON array of candidates from a file ("-" for stdin)
    #[arg(long, conflicts_with_all = ["subject", "predicate", "object"])]
    pub batch: Option<PathBuf>,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

pub fn run(args: AddArgs, ws: &Workspace) -> Result<()> {
    let candidates = match &args.batch {
        Some(path) => read_batch(path)?,
        None => vec![candidate_from_args(&args)?],
    };

    let memory = ws.open_memory()?;
    let ctx = ws.scope_context();

    let mut outcomes = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let outcome = memory
            .resolve(candidate, &ctx)
            .with_context(|| format!("resolving {} {}", candidate.predicate, candidate.object))?;
        outcomes.push(outcome);
    }

    match args.format.as_str() {
        "json" => {
            if args.batch.is_some() {
                print_json(&outcomes)?;
            } else {
                print_json(&outcomes[0])?;
            }
        }
        _ => {
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }
    }

    Ok(())
}

fn candidate_from_args(args: &AddArgs) -> Result<Candidate> {
    // clap enforces these outside batch mode
    let (Some(subject), Some(predicate), Some(object)) =
        (&args.subject, &args.predicate, &args.object)
    else {
        anyhow::bail!("subject, predicate and object are required");
    };

    let mut candidate = Candidate::new(subject.as_str(), predicate.as_str(), object.as_str())
        .with_subject_type(args.subject_type.as_str())
        .with_confidence(args.confidence)
        .with_strength(args.strength)
        .with_signal(args.supersedes)
        .with_scope(args.scope);
    if args.negative {
        candidate = candidate.with_polarity(Polarity::Negative);
    }
    if let Some(quote) = &args.quote {
        candidate = candidate.with_quote(quote.as_str());
    }
    if let Some(content) = &args.content {
        candidate = candidate.with_content(parse_id(content)?);
    }
    candidate.object_type = args.object_type.clone();
    Ok(candidate)
}

fn read_batch(path: &Path) -> Result<Vec<Candidate>> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&raw).context("expected a JSON array of candidates")
}

fn print_outcome(outcome: &ResolveOutcome) {
    let action = match outcome.action {
        Action::Insert => "inserted".green(),
        Action::Equivalent => "equivalent".cyan(),
        Action::Supersede => "superseded".yellow(),
        Action::Conflict => "conflict".red(),
    };
    print!("{} {} {}", "✓".green(), action.bold(), outcome.fact_id);
    match outcome.conflict_id {
        Some(conflict) => println!(" (conflict {})", conflict),
        None => println!(),
    }
}
