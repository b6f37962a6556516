//! Resolver - decides what a candidate fact does to its slot
//!
//! Given one candidate, the slot's current state and the predicate policy, the
//! resolver picks INSERT / EQUIVALENT / SUPERSEDE / CONFLICT and describes the
//! resulting writes as a [`WriteSet`]. It performs no I/O: applying the
//! write-set atomically is [`Storage`](super::storage::Storage)'s job.
//!
//! | predicate | slot | object | signal | action |
//! |-----------|------|--------|--------|--------|
//! | multi     | any  | seen   | -      | EQUIVALENT |
//! | multi     | any  | new    | -      | INSERT |
//! | exclusive | empty| -      | -      | INSERT |
//! | exclusive | held | same   | -      | EQUIVALENT |
//! | exclusive | held | other  | yes    | SUPERSEDE |
//! | exclusive | held | other  | no     | CONFLICT |
//!
//! SUPERSEDE closes the open conflicts against the retired holder; a value
//! that was already disputed is activated rather than inserted again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::error::{Error, Result};
use super::fact::{
    normalize_predicate, Conflict, ConflictStatus, EntityKey, Fact, FactLink, LinkType, Polarity,
    Scope, ScopeContext, Status, Strength,
};
use super::policy::{Classification, PredicatePolicy};

/// Default entity type for candidate subjects
pub const DEFAULT_SUBJECT_TYPE: &str = "concept";

/// One extracted statement, as handed over by the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub subject: Option<String>,
    #[serde(default = "default_subject_type")]
    pub subject_type: String,
    pub predicate: String,
    pub object: String,
    /// When set, the object is also registered as an entity of this type
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub polarity: Polarity,
    pub confidence: f32,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub strength: Strength,
    /// Opaque: the extractor saw language like "migrated from X to Y"
    #[serde(default)]
    pub supersession_signal: bool,
    /// Content item the quote came from; `None` stores the quote as its own item
    #[serde(default)]
    pub content_item_id: Option<Ulid>,
    #[serde(default = "default_scope")]
    pub scope: Scope,
}

fn default_subject_type() -> String {
    DEFAULT_SUBJECT_TYPE.to_string()
}

fn default_scope() -> Scope {
    Scope::Project
}

impl Candidate {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            subject_type: default_subject_type(),
            predicate: predicate.into(),
            object: object.into(),
            object_type: None,
            polarity: Polarity::Positive,
            confidence: 0.9,
            quote: String::new(),
            strength: Strength::Stated,
            supersession_signal: false,
            content_item_id: None,
            scope: default_scope(),
        }
    }

    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = quote.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_signal(mut self, signal: bool) -> Self {
        self.supersession_signal = signal;
        self
    }

    pub fn with_subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = subject_type.into();
        self
    }

    pub fn with_content(mut self, content_item_id: Ulid) -> Self {
        self.content_item_id = Some(content_item_id);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Reject malformed candidates before any store is touched.
    pub fn validate(&self) -> Result<()> {
        if normalize_predicate(&self.predicate).is_empty() {
            return Err(Error::validation("predicate must not be empty"));
        }
        if self.object.trim().is_empty() {
            return Err(Error::validation("object must not be empty"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::validation(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if self.content_item_id.is_none() && self.quote.trim().is_empty() {
            return Err(Error::validation(
                "a candidate needs a quote or a content item to cite",
            ));
        }
        Ok(())
    }

    pub fn subject_key(&self) -> Option<EntityKey> {
        self.subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| EntityKey::new(self.subject_type.clone(), s.trim()))
    }

    pub fn object_key(&self) -> Option<EntityKey> {
        self.object_type
            .as_ref()
            .map(|t| EntityKey::new(t.clone(), self.object.trim()))
    }
}

/// What the resolver decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Equivalent,
    Supersede,
    Conflict,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Insert => write!(f, "insert"),
            Action::Equivalent => write!(f, "equivalent"),
            Action::Supersede => write!(f, "supersede"),
            Action::Conflict => write!(f, "conflict"),
        }
    }
}

/// The slot a candidate lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotKey {
    pub subject: Option<EntityKey>,
    pub predicate: String,
    pub scope: Scope,
    pub project_path: Option<String>,
}

impl SlotKey {
    /// Slot for `candidate` under its own scope; project scope needs a path in `ctx`.
    pub fn for_candidate(candidate: &Candidate, ctx: &ScopeContext) -> Result<Self> {
        Ok(Self {
            subject: candidate.subject_key(),
            predicate: normalize_predicate(&candidate.predicate),
            scope: candidate.scope,
            project_path: ctx.project_path_for(candidate.scope)?,
        })
    }

    /// `subject/predicate`, for logs and contention errors.
    pub fn label(&self) -> String {
        match &self.subject {
            Some(key) => format!("{}/{}", key.slug(), self.predicate),
            None => self.predicate.clone(),
        }
    }
}

/// An open conflict against an active slot fact, with its disputed side
#[derive(Debug, Clone)]
pub struct Dispute {
    pub conflict: Conflict,
    pub disputed: Fact,
}

/// What the slot currently holds
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    /// Active facts, newest first
    pub active: Vec<Fact>,
    /// Proposed facts, newest first; matched for equivalence, never holders
    pub proposed: Vec<Fact>,
    /// Open conflicts whose `fact_a` is one of `active`
    pub disputes: Vec<Dispute>,
}

/// Where a receipt's source text lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Existing(Ulid),
    /// Store the text as a new content item in the same transaction
    Inline { id: Ulid, body: String },
}

impl ContentRef {
    pub fn id(&self) -> Ulid {
        match self {
            ContentRef::Existing(id) => *id,
            ContentRef::Inline { id, .. } => *id,
        }
    }
}

/// Provenance to attach to the write-set's target fact
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub id: Ulid,
    pub content: ContentRef,
    pub quote: String,
    pub strength: Strength,
    pub created_at: DateTime<Utc>,
}

/// A fact row to insert
#[derive(Debug, Clone)]
pub struct NewFact {
    /// `subject_entity_id` is filled in by the store from `subject_key`
    pub fact: Fact,
    pub subject_key: Option<EntityKey>,
    pub object_key: Option<EntityKey>,
    pub embedding: Option<Vec<f32>>,
}

/// A status change on an existing fact
#[derive(Debug, Clone, PartialEq)]
pub struct Retirement {
    pub fact_id: Ulid,
    pub status: Status,
    pub valid_to: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ConflictWrite {
    Open(Conflict),
    /// The same contradiction was seen again
    Refresh {
        conflict_id: Ulid,
        detected_at: DateTime<Utc>,
        notes: String,
    },
}

impl ConflictWrite {
    pub fn conflict_id(&self) -> Ulid {
        match self {
            ConflictWrite::Open(c) => c.id,
            ConflictWrite::Refresh { conflict_id, .. } => *conflict_id,
        }
    }
}

/// Intended writes for one resolution; applied in one transaction
#[derive(Debug, Clone)]
pub struct WriteSet {
    pub action: Action,
    /// The fact the candidate ends up attached to
    pub fact_id: Ulid,
    pub new_fact: Option<NewFact>,
    pub receipt: NewReceipt,
    pub retire: Option<Retirement>,
    /// Existing disputed fact that becomes the active holder
    pub activate: Option<Ulid>,
    pub link: Option<FactLink>,
    pub conflict: Option<ConflictWrite>,
    /// Open conflicts closed by this write
    pub resolve_conflicts: Vec<Ulid>,
}

impl WriteSet {
    pub fn outcome(&self) -> ResolveOutcome {
        ResolveOutcome {
            action: self.action,
            fact_id: self.fact_id,
            conflict_id: self.conflict.as_ref().map(ConflictWrite::conflict_id),
        }
    }
}

/// Result handed back to callers of `resolve`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub action: Action,
    pub fact_id: Ulid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<Ulid>,
}

/// Decision engine
#[derive(Debug, Clone)]
pub struct Resolver {
    policy: PredicatePolicy,
    /// Inferred candidates below this confidence are stored as `proposed`
    activation_threshold: f32,
}

impl Resolver {
    pub fn new(policy: PredicatePolicy, activation_threshold: f32) -> Self {
        Self {
            policy,
            activation_threshold,
        }
    }

    pub fn policy(&self) -> &PredicatePolicy {
        &self.policy
    }

    /// Decide the write-set for `candidate` landing in `slot`.
    ///
    /// Total over valid inputs: the same candidate and slot state always give
    /// the same action.
    pub fn decide(
        &self,
        candidate: &Candidate,
        slot: &SlotKey,
        state: &SlotState,
        now: DateTime<Utc>,
    ) -> Result<WriteSet> {
        candidate.validate()?;
        let classification = self.policy.classify(&slot.predicate);
        let object = candidate.object.trim();
        let receipt = self.receipt(candidate, now);

        let status = self.insert_status(candidate);
        let proposed = state
            .proposed
            .iter()
            .filter(|_| status == Status::Proposed);
        if let Some(existing) = state
            .active
            .iter()
            .chain(proposed)
            .find(|f| f.object_literal == object)
        {
            return Ok(WriteSet {
                action: Action::Equivalent,
                fact_id: existing.id,
                new_fact: None,
                receipt,
                retire: None,
                activate: None,
                link: None,
                conflict: None,
                resolve_conflicts: Vec::new(),
            });
        }

        let current = match (classification, state.active.first()) {
            (Classification { exclusive: true, .. }, Some(current)) => current,
            _ => {
                let new_fact = self.new_fact(candidate, slot, status, now);
                return Ok(WriteSet {
                    action: Action::Insert,
                    fact_id: new_fact.fact.id,
                    new_fact: Some(new_fact),
                    receipt,
                    retire: None,
                    activate: None,
                    link: None,
                    conflict: None,
                    resolve_conflicts: Vec::new(),
                });
            }
        };

        let mut against_current = state
            .disputes
            .iter()
            .filter(|d| d.conflict.fact_a_id == current.id);

        if candidate.supersession_signal {
            // A value already disputed against the holder takes over in place
            let prior = against_current
                .clone()
                .find(|d| d.disputed.object_literal == object);
            let (fact_id, new_fact, activate) = match prior {
                Some(d) => (d.disputed.id, None, Some(d.disputed.id)),
                None => {
                    let new_fact = self.new_fact(candidate, slot, Status::Active, now);
                    (new_fact.fact.id, Some(new_fact), None)
                }
            };
            return Ok(WriteSet {
                action: Action::Supersede,
                fact_id,
                new_fact,
                receipt,
                retire: Some(Retirement {
                    fact_id: current.id,
                    status: Status::Superseded,
                    valid_to: now,
                }),
                activate,
                link: Some(FactLink {
                    from_fact_id: fact_id,
                    to_fact_id: current.id,
                    link_type: LinkType::Supersedes,
                    created_at: now,
                }),
                conflict: None,
                resolve_conflicts: against_current.map(|d| d.conflict.id).collect(),
            });
        }

        let notes = format!(
            "{}: {} vs {}",
            slot.predicate, current.object_literal, object
        );

        let seen = against_current.find(|d| d.disputed.object_literal == object);
        if let Some(dispute) = seen {
            return Ok(WriteSet {
                action: Action::Conflict,
                fact_id: dispute.disputed.id,
                new_fact: None,
                receipt,
                retire: None,
                activate: None,
                link: None,
                conflict: Some(ConflictWrite::Refresh {
                    conflict_id: dispute.conflict.id,
                    detected_at: now,
                    notes,
                }),
                resolve_conflicts: Vec::new(),
            });
        }

        let new_fact = self.new_fact(candidate, slot, Status::Disputed, now);
        let conflict = Conflict {
            id: Ulid::new(),
            fact_a_id: current.id,
            fact_b_id: new_fact.fact.id,
            status: ConflictStatus::Open,
            notes: Some(notes),
            detected_at: now,
            resolved_at: None,
        };
        Ok(WriteSet {
            action: Action::Conflict,
            fact_id: new_fact.fact.id,
            new_fact: Some(new_fact),
            receipt,
            retire: None,
            activate: None,
            link: None,
            conflict: Some(ConflictWrite::Open(conflict)),
            resolve_conflicts: Vec::new(),
        })
    }

    fn insert_status(&self, candidate: &Candidate) -> Status {
        if candidate.strength == Strength::Inferred
            && candidate.confidence < self.activation_threshold
        {
            Status::Proposed
        } else {
            Status::Active
        }
    }

    fn receipt(&self, candidate: &Candidate, now: DateTime<Utc>) -> NewReceipt {
        let content = match candidate.content_item_id {
            Some(id) => ContentRef::Existing(id),
            None => ContentRef::Inline {
                id: Ulid::new(),
                body: candidate.quote.clone(),
            },
        };
        NewReceipt {
            id: Ulid::new(),
            content,
            quote: candidate.quote.clone(),
            strength: candidate.strength,
            created_at: now,
        }
    }

    fn new_fact(
        &self,
        candidate: &Candidate,
        slot: &SlotKey,
        status: Status,
        now: DateTime<Utc>,
    ) -> NewFact {
        let fact = Fact {
            id: Ulid::new(),
            subject_entity_id: None,
            subject: slot.subject.as_ref().map(|k| k.name.clone()),
            subject_type: slot.subject.as_ref().map(|k| k.entity_type.clone()),
            predicate: slot.predicate.clone(),
            object_literal: candidate.object.trim().to_string(),
            object_entity_id: None,
            polarity: candidate.polarity,
            confidence: candidate.confidence,
            status,
            scope: slot.scope,
            project_path: slot.project_path.clone(),
            valid_from: now,
            valid_to: None,
            created_at: now,
        };
        NewFact {
            fact,
            subject_key: slot.subject.clone(),
            object_key: candidate.object_key(),
            embedding: None,
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(PredicatePolicy::new(), 0.5)
    }
}
