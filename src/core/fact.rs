//! Fact - Core data structures
//!
//! A fact is a subject–predicate–object statement derived from ingested text.
//!
//! # Key Properties
//! - **id**: ULID (sortable, unique across stores)
//! - **slot**: `(subject, predicate, scope, project_path)`; exclusive predicates
//!   hold at most one `active` fact per slot
//! - **status**: proposed → active → superseded / disputed / expired
//! - Facts are never deleted; history lives in `FactLink` and `Conflict` rows

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::error::{Error, Result};

/// Current time at the precision timestamps are stored with (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Whether a fact applies to the current project or to the user everywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Project,
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Global => "global",
        }
    }

    /// Merge priority: project results sort before global ones.
    pub fn priority(&self) -> u8 {
        match self {
            Scope::Project => 0,
            Scope::Global => 1,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "project" => Ok(Scope::Project),
            "global" => Ok(Scope::Global),
            _ => Err(Error::validation(format!("unknown scope: {s}"))),
        }
    }
}

/// Which stores a query reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeSelector {
    Project,
    Global,
    /// Project first, then global
    #[default]
    All,
}

impl ScopeSelector {
    /// Scopes to read, in priority order.
    pub fn scopes(&self) -> &'static [Scope] {
        match self {
            ScopeSelector::Project => &[Scope::Project],
            ScopeSelector::Global => &[Scope::Global],
            ScopeSelector::All => &[Scope::Project, Scope::Global],
        }
    }
}

impl std::fmt::Display for ScopeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeSelector::Project => write!(f, "project"),
            ScopeSelector::Global => write!(f, "global"),
            ScopeSelector::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for ScopeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "project" => Ok(ScopeSelector::Project),
            "global" => Ok(ScopeSelector::Global),
            "all" => Ok(ScopeSelector::All),
            _ => Err(Error::validation(format!(
                "unknown scope: {s} (expected project, global or all)"
            ))),
        }
    }
}

/// Explicit replacement for reading the project path from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    pub project_path: Option<String>,
}

impl ScopeContext {
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: Some(project_path.into()),
        }
    }

    /// A context with no current project; only global scope is usable.
    pub fn global_only() -> Self {
        Self { project_path: None }
    }

    /// The `project_path` a fact in `scope` must carry.
    ///
    /// Project scope requires a project path; global scope never has one.
    pub fn project_path_for(&self, scope: Scope) -> Result<Option<String>> {
        match scope {
            Scope::Global => Ok(None),
            Scope::Project => match &self.project_path {
                Some(path) if !path.trim().is_empty() => Ok(Some(path.clone())),
                _ => Err(Error::validation(
                    "project scope requires a project path in the scope context",
                )),
            },
        }
    }
}

/// Fact status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Low-confidence inferred fact, not occupying its slot
    Proposed,
    /// Current authoritative value
    #[default]
    Active,
    /// Contradicts the active value; tracked by an open conflict
    Disputed,
    /// Replaced by a newer fact (see `FactLink`)
    Superseded,
    /// Aged out by maintenance
    Expired,
}

impl Status {
    /// Statuses that recall returns.
    pub const CURRENT: [Status; 3] = [Status::Active, Status::Disputed, Status::Proposed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Proposed => "proposed",
            Status::Active => "active",
            Status::Disputed => "disputed",
            Status::Superseded => "superseded",
            Status::Expired => "expired",
        }
    }

    pub fn is_current(&self) -> bool {
        Self::CURRENT.contains(self)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proposed" => Ok(Status::Proposed),
            "active" => Ok(Status::Active),
            "disputed" => Ok(Status::Disputed),
            "superseded" => Ok(Status::Superseded),
            "expired" => Ok(Status::Expired),
            _ => Err(Error::Decode(format!("unknown fact status: {s}"))),
        }
    }
}

/// Whether the statement is asserted or negated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }
}

impl std::str::FromStr for Polarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "+" => Ok(Polarity::Positive),
            "negative" | "-" => Ok(Polarity::Negative),
            _ => Err(Error::validation(format!("unknown polarity: {s}"))),
        }
    }
}

/// How directly the source text supports a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    #[default]
    Stated,
    Inferred,
}

impl Strength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Stated => "stated",
            Strength::Inferred => "inferred",
        }
    }
}

impl std::str::FromStr for Strength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stated" => Ok(Strength::Stated),
            "inferred" => Ok(Strength::Inferred),
            _ => Err(Error::validation(format!("unknown strength: {s}"))),
        }
    }
}

/// A named thing facts can be about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Ulid,
    pub entity_type: String,
    pub canonical_name: String,
    /// `(entity_type, slug)` is unique per store
    pub slug: String,
}

/// Lookup key for an entity: type plus name (slugified on use)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
        }
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Normalize a name into its slug: lowercase alphanumeric runs joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Normalize a predicate name: trimmed, lowercase, separators as `_`.
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// A subject–predicate–object statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier (ULID)
    pub id: Ulid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_entity_id: Option<Ulid>,

    /// Canonical name of the subject entity (joined in on load)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,

    pub predicate: String,

    pub object_literal: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_entity_id: Option<Ulid>,

    #[serde(default)]
    pub polarity: Polarity,

    /// Stored verbatim in [0, 1]
    pub confidence: f32,

    #[serde(default)]
    pub status: Status,

    pub scope: Scope,

    /// Present iff `scope == Project`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,

    pub valid_from: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Dedup key used when merging results across stores
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Fact {
    /// `(subject slug, predicate, object)`, case-insensitive on object.
    pub fn signature(&self) -> Signature {
        Signature {
            subject: self.subject.as_deref().map(slugify).unwrap_or_default(),
            predicate: self.predicate.clone(),
            object: self.object_literal.trim().to_lowercase(),
        }
    }

    /// Text fed to the embedder for this fact.
    pub fn embedding_text(&self) -> String {
        embedding_text(
            self.subject.as_deref(),
            &self.predicate,
            &self.object_literal,
        )
    }

    /// Get short ID (first 8 chars)
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_lowercase()
    }
}

/// Natural-language rendering of a statement, used for embeddings.
pub fn embedding_text(subject: Option<&str>, predicate: &str, object: &str) -> String {
    let predicate = predicate.replace('_', " ");
    match subject {
        Some(subject) => format!("{subject} {predicate} {object}"),
        None => format!("{predicate} {object}"),
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let negation = match self.polarity {
            Polarity::Positive => "",
            Polarity::Negative => "NOT ",
        };
        write!(
            f,
            "[{}] {} {}{} = {} ({}, {})",
            self.short_id(),
            self.subject.as_deref().unwrap_or("-"),
            negation,
            self.predicate,
            self.object_literal,
            self.status,
            self.scope
        )
    }
}

/// Evidence linking a fact to the text it was derived from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub id: Ulid,
    pub fact_id: Ulid,
    pub content_item_id: Ulid,
    pub quote: String,
    pub strength: Strength,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Supersedes,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Supersedes => "supersedes",
        }
    }
}

/// Directed history edge: `from` replaced `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactLink {
    pub from_fact_id: Ulid,
    pub to_fact_id: Ulid,
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Open => "open",
            ConflictStatus::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(ConflictStatus::Open),
            "resolved" => Ok(ConflictStatus::Resolved),
            _ => Err(Error::Decode(format!("unknown conflict status: {s}"))),
        }
    }
}

/// An unresolved contradiction between two facts in one slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Ulid,
    /// The fact that held the slot
    pub fact_a_id: Ulid,
    /// The contradicting newcomer
    pub fact_b_id: Ulid,
    pub status: ConflictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Get short ID (first 8 chars)
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_lowercase()
    }
}

/// A fact together with its provenance receipts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactBundle {
    pub fact: Fact,
    pub receipts: Vec<Provenance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(subject: Option<&str>, predicate: &str, object: &str) -> Fact {
        let now = Utc::now();
        Fact {
            id: Ulid::new(),
            subject_entity_id: None,
            subject: subject.map(str::to_string),
            subject_type: subject.map(|_| "concept".to_string()),
            predicate: predicate.to_string(),
            object_literal: object.to_string(),
            object_entity_id: None,
            polarity: Polarity::Positive,
            confidence: 0.9,
            status: Status::Active,
            scope: Scope::Global,
            project_path: None,
            valid_from: now,
            valid_to: None,
            created_at: now,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Repo"), "my-repo");
        assert_eq!(slugify("  --Factkeep__CLI v2!  "), "factkeep-cli-v2");
        assert_eq!(slugify("repo"), "repo");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_normalize_predicate() {
        assert_eq!(normalize_predicate(" Uses Database "), "uses_database");
        assert_eq!(normalize_predicate("deployment-platform"), "deployment_platform");
        assert_eq!(normalize_predicate("convention"), "convention");
    }

    #[test]
    fn test_signature_ignores_case_of_subject_and_object() {
        let a = fact(Some("My Repo"), "uses_database", "PostgreSQL");
        let b = fact(Some("my-repo"), "uses_database", " postgresql ");
        assert_eq!(a.signature(), b.signature());

        let c = fact(Some("my-repo"), "uses_database", "MySQL");
        assert_ne!(a.signature(), c.signature());
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("project".parse::<Scope>().unwrap(), Scope::Project);
        assert_eq!("GLOBAL".parse::<Scope>().unwrap(), Scope::Global);
        assert!(matches!(
            "everywhere".parse::<Scope>(),
            Err(Error::Validation(_))
        ));
        assert_eq!("all".parse::<ScopeSelector>().unwrap(), ScopeSelector::All);
        assert!("both".parse::<ScopeSelector>().is_err());
    }

    #[test]
    fn test_scope_selector_order() {
        assert_eq!(ScopeSelector::All.scopes(), &[Scope::Project, Scope::Global]);
        assert_eq!(ScopeSelector::Global.scopes(), &[Scope::Global]);
    }

    #[test]
    fn test_project_path_required_for_project_scope() {
        let ctx = ScopeContext::global_only();
        assert!(ctx.project_path_for(Scope::Project).is_err());
        assert_eq!(ctx.project_path_for(Scope::Global).unwrap(), None);

        let ctx = ScopeContext::new("/work/repo");
        assert_eq!(
            ctx.project_path_for(Scope::Project).unwrap().as_deref(),
            Some("/work/repo")
        );
        assert_eq!(ctx.project_path_for(Scope::Global).unwrap(), None);
    }

    #[test]
    fn test_current_statuses() {
        assert!(Status::Active.is_current());
        assert!(Status::Disputed.is_current());
        assert!(Status::Proposed.is_current());
        assert!(!Status::Superseded.is_current());
        assert!(!Status::Expired.is_current());
    }

    #[test]
    fn test_embedding_text() {
        let f = fact(Some("repo"), "uses_database", "PostgreSQL");
        assert_eq!(f.embedding_text(), "repo uses database PostgreSQL");
        let f = fact(None, "convention", "tabs");
        assert_eq!(f.embedding_text(), "convention tabs");
    }

    #[test]
    fn test_short_ids() {
        let f = fact(Some("repo"), "uses_database", "MySQL");
        assert_eq!(f.short_id().len(), 8);
        assert!(f.id.to_string().to_lowercase().starts_with(&f.short_id()));

        let conflict = Conflict {
            id: Ulid::new(),
            fact_a_id: f.id,
            fact_b_id: Ulid::new(),
            status: ConflictStatus::Open,
            notes: None,
            detected_at: Utc::now(),
            resolved_at: None,
        };
        assert_eq!(conflict.short_id(), conflict.id.to_string()[..8].to_lowercase());
    }

    #[test]
    fn test_display() {
        let f = fact(Some("repo"), "uses_database", "MySQL");
        let shown = f.to_string();
        assert!(shown.contains("repo uses_database = MySQL"));
        assert!(shown.contains("active"));
    }
}
