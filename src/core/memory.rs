//! Memory - the public face of the engine
//!
//! Ties the [`Resolver`] (write decisions), the [`RecallEngine`] (reads) and
//! the [`Retrier`] (contention) together. Every write goes through one
//! `BEGIN IMMEDIATE` transaction: read the slot, decide, apply.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use super::error::{Error, Result};
use super::fact::{now, Fact, FactBundle, Provenance, Scope, ScopeContext, ScopeSelector, Status};
use super::ranking::Hit;
use super::recall::{ConflictView, Explanation, RecallEngine, SemanticMode};
use super::resolver::{Candidate, ResolveOutcome, Resolver, SlotKey, WriteSet, DEFAULT_SUBJECT_TYPE};
use super::retry::Retrier;
use super::storage::{ScopeFilter, Storage, StorageStats, Txn};

pub struct Memory {
    engine: RecallEngine,
    resolver: Resolver,
    retrier: Retrier,
}

impl Memory {
    pub fn new(engine: RecallEngine, resolver: Resolver, retrier: Retrier) -> Self {
        Self {
            engine,
            resolver,
            retrier,
        }
    }

    pub fn engine(&self) -> &RecallEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve one candidate into its slot.
    pub fn resolve(&self, candidate: &Candidate, ctx: &ScopeContext) -> Result<ResolveOutcome> {
        candidate.validate()?;
        let slot = SlotKey::for_candidate(candidate, ctx)?;
        let store = self.engine.backend().store(slot.scope);
        let label = slot.label();

        let ws = self
            .retrier
            .run(&label, || store.write(|tx| self.decide_and_apply(tx, candidate, &slot)))?;

        info!(
            slot = %label,
            scope = %slot.scope,
            action = %ws.action,
            fact = %ws.fact_id,
            "resolved candidate"
        );
        Ok(ws.outcome())
    }

    fn decide_and_apply(&self, tx: &Txn<'_>, candidate: &Candidate, slot: &SlotKey) -> Result<WriteSet> {
        let state = tx.slot_state(slot)?;
        let mut ws = self.resolver.decide(candidate, slot, &state, now())?;
        if let Some(new_fact) = ws.new_fact.as_mut() {
            let text = new_fact.fact.embedding_text();
            new_fact.embedding = Some(self.engine.embedder().embed(&text));
        }
        tx.apply(&ws)?;
        Ok(ws)
    }

    /// Store raw text for lexical recall; candidates can then cite it.
    pub fn ingest(&self, text: &str, scope: Scope, ctx: &ScopeContext) -> Result<Ulid> {
        if text.trim().is_empty() {
            return Err(Error::validation("nothing to ingest"));
        }
        ScopeFilter::for_scope(scope, ctx)?;
        let store = self.engine.backend().store(scope);
        let id = self.retrier.run("ingest", || store.add_content(text, now()))?;
        debug!(content = %id, scope = %scope, bytes = text.len(), "ingested content");
        Ok(id)
    }

    /// Copy an active project fact into global scope.
    ///
    /// The copy is resolved against the global slot like any candidate, so
    /// it can come back EQUIVALENT or CONFLICT. All receipts and their
    /// content items come along.
    pub fn promote(&self, fact_id: &Ulid, ctx: &ScopeContext) -> Result<ResolveOutcome> {
        let filter = ScopeFilter::for_scope(Scope::Project, ctx)?;
        let source = self.engine.backend().store(Scope::Project);

        let loaded = source.read(|tx| {
            let Some(fact) = tx.get_fact(fact_id, &filter)? else {
                return Ok(None);
            };
            let receipts = tx.load_receipts(&[fact.id])?;
            let mut content_ids: Vec<Ulid> = Vec::with_capacity(receipts.len());
            for r in &receipts {
                if !content_ids.contains(&r.content_item_id) {
                    content_ids.push(r.content_item_id);
                }
            }
            let contents = tx.content_items(&content_ids)?;
            Ok(Some((fact, receipts, contents)))
        })?;

        let Some((fact, receipts, contents)) = loaded else {
            return Err(Error::validation(format!("no project fact {fact_id}")));
        };
        if fact.status != Status::Active {
            return Err(Error::validation(format!(
                "only active facts can be promoted ({} is {})",
                fact.short_id(),
                fact.status
            )));
        }

        let candidate = promotion_candidate(&fact, receipts.first());
        let slot = SlotKey::for_candidate(&candidate, &ScopeContext::global_only())?;
        let target = self.engine.backend().store(Scope::Global);
        let label = slot.label();

        let ws = self.retrier.run(&label, || {
            target.write(|tx| {
                for item in &contents {
                    tx.insert_content(item)?;
                }
                let ws = self.decide_and_apply(tx, &candidate, &slot)?;
                for r in receipts.iter().skip(1) {
                    tx.insert_receipt(&Provenance {
                        id: Ulid::new(),
                        fact_id: ws.fact_id,
                        content_item_id: r.content_item_id,
                        quote: r.quote.clone(),
                        strength: r.strength,
                        created_at: r.created_at,
                    })?;
                }
                Ok(ws)
            })
        })?;

        info!(
            from = %fact.id,
            to = %ws.fact_id,
            action = %ws.action,
            receipts = receipts.len(),
            "promoted fact to global"
        );
        Ok(ws.outcome())
    }

    pub fn recall(
        &self,
        text: &str,
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<FactBundle>> {
        self.engine.query(text, limit, selector, ctx)
    }

    pub fn recall_semantic(
        &self,
        text: &str,
        limit: usize,
        selector: ScopeSelector,
        mode: SemanticMode,
        ctx: &ScopeContext,
    ) -> Result<Vec<Hit>> {
        self.engine.query_semantic(text, limit, selector, mode, ctx)
    }

    pub fn recall_concepts<S: AsRef<str>>(
        &self,
        concepts: &[S],
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<Hit>> {
        self.engine.query_concepts(concepts, limit, selector, ctx)
    }

    pub fn explain(
        &self,
        fact_id: &Ulid,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Option<Explanation>> {
        self.engine.explain(fact_id, selector, ctx)
    }

    pub fn conflicts(&self, selector: ScopeSelector, ctx: &ScopeContext) -> Result<Vec<ConflictView>> {
        self.engine.conflicts(selector, ctx)
    }

    pub fn changes(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<Fact>> {
        self.engine.changes(since, limit, selector, ctx)
    }

    /// Per-source statistics, in priority order.
    pub fn stats(
        &self,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<(ScopeFilter, StorageStats)>> {
        self.engine
            .backend()
            .sources(selector, ctx)?
            .into_iter()
            .map(|source| {
                let stats = source.storage.stats(&source.filter)?;
                Ok((source.filter, stats))
            })
            .collect()
    }

    /// The store that holds `scope`.
    pub fn store(&self, scope: Scope) -> &Storage {
        self.engine.backend().store(scope)
    }
}

fn promotion_candidate(fact: &Fact, first: Option<&Provenance>) -> Candidate {
    let (quote, strength, content) = match first {
        Some(r) => (r.quote.clone(), r.strength, Some(r.content_item_id)),
        None => (fact.embedding_text(), Default::default(), None),
    };
    Candidate {
        subject: fact.subject.clone(),
        subject_type: fact
            .subject_type
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT_TYPE.to_string()),
        predicate: fact.predicate.clone(),
        object: fact.object_literal.clone(),
        object_type: None,
        polarity: fact.polarity,
        confidence: fact.confidence,
        quote,
        strength,
        supersession_signal: false,
        content_item_id: content,
        scope: Scope::Global,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embedding::testing::KeywordEmbedder;
    use crate::core::fact::{ConflictStatus, Strength};
    use crate::core::recall::{Backend, RecallSettings};
    use crate::core::resolver::Action;
    use crate::core::retry::RetryPolicy;
    use std::path::Path;
    use std::time::Duration;

    fn memory(backend: Backend) -> Memory {
        Memory::new(
            RecallEngine::new(backend, Box::new(KeywordEmbedder), RecallSettings::default()),
            Resolver::default(),
            Retrier::new(RetryPolicy::none()),
        )
    }

    fn ctx() -> ScopeContext {
        ScopeContext::new("/work/repo")
    }

    fn db(object: &str, quote: &str) -> Candidate {
        Candidate::new("repo", "uses_database", object).with_quote(quote)
    }

    #[test]
    fn test_database_migration_scenario() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));

        let a = memory.resolve(&db("MySQL", "the database is MySQL"), &ctx())?;
        assert_eq!(a.action, Action::Insert);

        let b = memory.resolve(
            &db("PostgreSQL", "we migrated the database from MySQL to PostgreSQL").with_signal(true),
            &ctx(),
        )?;
        assert_eq!(b.action, Action::Supersede);

        let c = memory.resolve(&db("MongoDB", "the database is MongoDB now"), &ctx())?;
        assert_eq!(c.action, Action::Conflict);
        let conflict_id = c.conflict_id.expect("conflict opened");

        let recalled = memory.recall("database", 10, ScopeSelector::All, &ctx())?;
        let objects: Vec<&str> = recalled.iter().map(|b| b.fact.object_literal.as_str()).collect();
        assert!(objects.contains(&"PostgreSQL"));
        assert!(!objects.contains(&"MySQL"));

        let old = memory.explain(&a.fact_id, ScopeSelector::All, &ctx())?.expect("kept");
        assert_eq!(old.fact.status, Status::Superseded);
        assert_eq!(old.superseded_by[0].id, b.fact_id);

        let conflicts = memory.conflicts(ScopeSelector::All, &ctx())?;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict.id, conflict_id);
        assert_eq!(conflicts[0].conflict.status, ConflictStatus::Open);
        assert_eq!(conflicts[0].fact_a.object_literal, "PostgreSQL");
        assert_eq!(conflicts[0].fact_b.object_literal, "MongoDB");
        Ok(())
    }

    #[test]
    fn test_resolve_is_idempotent() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));
        let candidate = db("MySQL", "the database is MySQL");

        let first = memory.resolve(&candidate, &ctx())?;
        let second = memory.resolve(&candidate, &ctx())?;
        assert_eq!(first.action, Action::Insert);
        assert_eq!(second.action, Action::Equivalent);
        assert_eq!(second.fact_id, first.fact_id);

        let stats = memory.stats(ScopeSelector::Project, &ctx())?;
        assert_eq!(stats[0].1.total_facts, 1);
        let explained = memory.explain(&first.fact_id, ScopeSelector::All, &ctx())?.expect("exists");
        assert_eq!(explained.receipts.len(), 2);
        Ok(())
    }

    #[test]
    fn test_signal_promotes_disputed_value_in_place() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));

        let holder = memory.resolve(&db("PostgreSQL", "the database is PostgreSQL"), &ctx())?;
        let disputed = memory.resolve(&db("MongoDB", "maybe the database is MongoDB"), &ctx())?;
        assert_eq!(disputed.action, Action::Conflict);

        let moved = memory.resolve(
            &db("MongoDB", "we moved the database to MongoDB").with_signal(true),
            &ctx(),
        )?;
        assert_eq!(moved.action, Action::Supersede);
        assert_eq!(moved.fact_id, disputed.fact_id);

        let recalled = memory.recall("database", 10, ScopeSelector::All, &ctx())?;
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].fact.id, disputed.fact_id);
        assert_eq!(recalled[0].fact.status, Status::Active);
        assert_eq!(recalled[0].receipts.len(), 2);

        let stats = memory.stats(ScopeSelector::Project, &ctx())?;
        assert_eq!(stats[0].1.total_facts, 2);
        assert_eq!(stats[0].1.active_facts, 1);
        assert_eq!(stats[0].1.disputed_facts, 0);

        let explained = memory.explain(&moved.fact_id, ScopeSelector::All, &ctx())?.expect("kept");
        assert_eq!(explained.supersedes[0].id, holder.fact_id);
        Ok(())
    }

    #[test]
    fn test_supersede_closes_conflicts_against_the_holder() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));

        let holder = memory.resolve(&db("PostgreSQL", "the database is PostgreSQL"), &ctx())?;
        let mongo = memory.resolve(&db("MongoDB", "the database is MongoDB"), &ctx())?;
        let redis = memory.resolve(&db("Redis", "the database is Redis"), &ctx())?;
        assert_eq!(memory.conflicts(ScopeSelector::All, &ctx())?.len(), 2);

        let moved = memory.resolve(
            &db("MySQL", "we switched the database to MySQL").with_signal(true),
            &ctx(),
        )?;
        assert_eq!(moved.action, Action::Supersede);
        assert!(memory.conflicts(ScopeSelector::All, &ctx())?.is_empty());

        let old = memory.explain(&holder.fact_id, ScopeSelector::All, &ctx())?.expect("kept");
        assert_eq!(old.conflicts.len(), 2);
        for conflict in &old.conflicts {
            assert_eq!(conflict.status, ConflictStatus::Resolved);
            assert!(conflict.resolved_at.is_some());
            assert!(conflict.resolved_at >= Some(conflict.detected_at));
        }

        // The losing values stay disputed for review
        let stats = memory.stats(ScopeSelector::Project, &ctx())?;
        assert_eq!(stats[0].1.disputed_facts, 2);
        assert_eq!(stats[0].1.open_conflicts, 0);
        for id in [mongo.fact_id, redis.fact_id] {
            let fact = memory.explain(&id, ScopeSelector::All, &ctx())?.expect("kept").fact;
            assert_eq!(fact.status, Status::Disputed);
        }
        Ok(())
    }

    #[test]
    fn test_resolve_is_idempotent_for_proposed_facts() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));
        let candidate = Candidate::new("repo", "convention", "squash merges")
            .with_quote("looks like they squash merges")
            .with_strength(Strength::Inferred)
            .with_confidence(0.3);

        let first = memory.resolve(&candidate, &ctx())?;
        let second = memory.resolve(&candidate, &ctx())?;
        assert_eq!(first.action, Action::Insert);
        assert_eq!(second.action, Action::Equivalent);
        assert_eq!(second.fact_id, first.fact_id);

        let stats = memory.stats(ScopeSelector::Project, &ctx())?;
        assert_eq!(stats[0].1.total_facts, 1);
        assert_eq!(stats[0].1.proposed_facts, 1);

        // A stated value is not held back by the proposal
        let stated = memory.resolve(
            &Candidate::new("repo", "convention", "squash merges").with_quote("we squash merges"),
            &ctx(),
        )?;
        assert_eq!(stated.action, Action::Insert);
        assert_ne!(stated.fact_id, first.fact_id);
        Ok(())
    }

    #[test]
    fn test_validation_happens_before_any_write() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));
        let before = memory.store(Scope::Project).query_count();

        let err = memory
            .resolve(&db("MySQL", "q").with_confidence(2.0), &ctx())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = memory
            .resolve(&db("MySQL", "q"), &ScopeContext::global_only())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(memory.store(Scope::Project).query_count(), before);
        Ok(())
    }

    #[test]
    fn test_ingested_content_can_be_cited() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));
        let content = memory.ingest(
            "Deploys go to fly.io every Friday",
            Scope::Project,
            &ctx(),
        )?;
        let outcome = memory.resolve(
            &Candidate::new("repo", "deployment_platform", "fly.io").with_content(content),
            &ctx(),
        )?;

        let hits = memory.recall("Friday", 5, ScopeSelector::All, &ctx())?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.id, outcome.fact_id);
        assert_eq!(hits[0].receipts[0].content_item_id, content);

        assert!(matches!(
            memory.ingest("   ", Scope::Project, &ctx()),
            Err(Error::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_promote_copies_fact_and_receipts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let memory = memory(Backend::open_dual(
            &dir.path().join("project.db"),
            &dir.path().join("global.db"),
            Duration::from_millis(500),
        )?);

        let local = memory.resolve(&db("PostgreSQL", "postgres for everything"), &ctx())?;
        memory.resolve(&db("PostgreSQL", "still postgres"), &ctx())?;

        let promoted = memory.promote(&local.fact_id, &ctx())?;
        assert_eq!(promoted.action, Action::Insert);
        assert_ne!(promoted.fact_id, local.fact_id);

        let global = memory
            .explain(&promoted.fact_id, ScopeSelector::Global, &ctx())?
            .expect("global copy");
        assert_eq!(global.fact.scope, Scope::Global);
        assert_eq!(global.fact.project_path, None);
        assert_eq!(global.receipts.len(), 2);

        // Content came along, so the global copy is found lexically
        let hits = memory.recall("postgres", 5, ScopeSelector::Global, &ScopeContext::global_only())?;
        assert_eq!(hits.len(), 1);

        let again = memory.promote(&local.fact_id, &ctx())?;
        assert_eq!(again.action, Action::Equivalent);
        assert_eq!(again.fact_id, promoted.fact_id);
        Ok(())
    }

    #[test]
    fn test_promote_rejects_unknown_and_retired_facts() -> Result<()> {
        let memory = memory(Backend::Single(Storage::open_memory()?));
        assert!(matches!(
            memory.promote(&Ulid::new(), &ctx()),
            Err(Error::Validation(_))
        ));

        let old = memory.resolve(&db("MySQL", "mysql"), &ctx())?;
        memory.resolve(&db("PostgreSQL", "moved to postgres").with_signal(true), &ctx())?;
        assert!(matches!(
            memory.promote(&old.fact_id, &ctx()),
            Err(Error::Validation(_))
        ));
        Ok(())
    }

    fn open_shared(path: &Path) -> Result<Memory> {
        Ok(Memory::new(
            RecallEngine::new(
                Backend::open_single(path, Duration::from_secs(10))?,
                Box::new(KeywordEmbedder),
                RecallSettings::default(),
            ),
            Resolver::default(),
            Retrier::default(),
        ))
    }

    #[test]
    fn test_single_active_under_concurrent_writers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("facts.db");
        open_shared(&path)?;

        let handles: Vec<_> = ["MySQL", "PostgreSQL", "MongoDB", "SQLite"]
            .into_iter()
            .map(|object| {
                let path = path.clone();
                std::thread::spawn(move || -> Result<Action> {
                    let memory = open_shared(&path)?;
                    let candidate = db(object, &format!("the database is {object}"));
                    Ok(memory.resolve(&candidate, &ctx())?.action)
                })
            })
            .collect();

        let mut actions = Vec::new();
        for handle in handles {
            actions.push(handle.join().expect("writer thread panicked")?);
        }
        assert_eq!(actions.iter().filter(|a| **a == Action::Insert).count(), 1);
        assert_eq!(actions.iter().filter(|a| **a == Action::Conflict).count(), 3);

        let memory = open_shared(&path)?;
        let stats = memory.stats(ScopeSelector::Project, &ctx())?;
        assert_eq!(stats[0].1.active_facts, 1);
        assert_eq!(stats[0].1.disputed_facts, 3);
        assert_eq!(stats[0].1.open_conflicts, 3);
        Ok(())
    }
}
