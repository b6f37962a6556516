//! Recall - read side over one or two stores
//!
//! [`Backend`] is picked once at construction: `Single` keeps both scopes in
//! one file (told apart by scope filters), `Dual` keeps a project file and a
//! global file. Queries read sources in priority order (project, then
//! global), one read transaction per source, and merge with [`ranking`].
//!
//! Store round-trips per source are fixed: four for a lexical query, three
//! for a vector query, however large `limit` is.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use super::embedding::Embedder;
use super::error::{Error, Result};
use super::fact::{Conflict, Fact, FactBundle, Provenance, Scope, ScopeContext, ScopeSelector};
use super::ranking::{self, Hit, HitOrigin};
use super::storage::{ScopeFilter, Storage};

pub const MIN_CONCEPTS: usize = 2;
pub const MAX_CONCEPTS: usize = 5;

/// Which stores back the engine
pub enum Backend {
    /// Both scopes in one file
    Single(Storage),
    Dual { project: Storage, global: Storage },
}

impl Backend {
    pub fn open_single(path: &Path, busy_timeout: Duration) -> Result<Self> {
        Ok(Backend::Single(Storage::open_with_timeout(path, busy_timeout)?))
    }

    pub fn open_dual(project: &Path, global: &Path, busy_timeout: Duration) -> Result<Self> {
        Ok(Backend::Dual {
            project: Storage::open_with_timeout(project, busy_timeout)?,
            global: Storage::open_with_timeout(global, busy_timeout)?,
        })
    }

    /// Store holding facts of `scope`.
    pub fn store(&self, scope: Scope) -> &Storage {
        match (self, scope) {
            (Backend::Single(storage), _) => storage,
            (Backend::Dual { project, .. }, Scope::Project) => project,
            (Backend::Dual { global, .. }, Scope::Global) => global,
        }
    }

    /// Every distinct store (one in single mode).
    pub fn stores(&self) -> Vec<&Storage> {
        match self {
            Backend::Single(storage) => vec![storage],
            Backend::Dual { project, global } => vec![project, global],
        }
    }

    /// Total statements executed across stores.
    pub fn query_count(&self) -> u64 {
        self.stores().iter().map(|s| s.query_count()).sum()
    }

    /// Sources to read for `selector`, in priority order.
    ///
    /// `all` without a project path reads global only; asking for `project`
    /// explicitly without one is a validation error.
    pub fn sources(&self, selector: ScopeSelector, ctx: &ScopeContext) -> Result<Vec<Source<'_>>> {
        let mut sources = Vec::with_capacity(2);
        for scope in selector.scopes() {
            let filter = match ScopeFilter::for_scope(*scope, ctx) {
                Ok(filter) => filter,
                Err(_) if selector == ScopeSelector::All => continue,
                Err(e) => return Err(e),
            };
            sources.push(Source {
                storage: self.store(*scope),
                filter,
            });
        }
        Ok(sources)
    }
}

/// One logical source: a store plus the filter selecting its scope
pub struct Source<'a> {
    pub storage: &'a Storage,
    pub filter: ScopeFilter,
}

/// Tuning knobs for recall
#[derive(Debug, Clone, PartialEq)]
pub struct RecallSettings {
    pub overfetch_factor: usize,
    /// Most embeddings scored per source
    pub semantic_candidate_cap: usize,
    pub concept_overfetch: usize,
    /// Neutral score given to lexical hits in semantic queries
    pub text_score: f32,
    pub min_similarity: f32,
    pub explain_walk_limit: usize,
}

impl Default for RecallSettings {
    fn default() -> Self {
        Self {
            overfetch_factor: 3,
            semantic_candidate_cap: 5_000,
            concept_overfetch: 4,
            text_score: 0.5,
            min_similarity: 0.1,
            explain_walk_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticMode {
    #[default]
    Vector,
    Text,
    Both,
}

impl std::str::FromStr for SemanticMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(SemanticMode::Vector),
            "text" => Ok(SemanticMode::Text),
            "both" => Ok(SemanticMode::Both),
            _ => Err(Error::validation(format!(
                "unknown mode: {s} (expected vector, text or both)"
            ))),
        }
    }
}

/// Everything known about one fact's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub fact: Fact,
    pub receipts: Vec<Provenance>,
    /// Facts this one replaced
    pub supersedes: Vec<Fact>,
    /// Facts that replaced this one
    pub superseded_by: Vec<Fact>,
    pub conflicts: Vec<Conflict>,
}

/// An open conflict with both sides loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictView {
    pub conflict: Conflict,
    pub fact_a: Fact,
    pub fact_b: Fact,
}

pub struct RecallEngine {
    backend: Backend,
    embedder: Box<dyn Embedder>,
    settings: RecallSettings,
}

impl RecallEngine {
    pub fn new(backend: Backend, embedder: Box<dyn Embedder>, settings: RecallSettings) -> Self {
        Self {
            backend,
            embedder,
            settings,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn settings(&self) -> &RecallSettings {
        &self.settings
    }

    fn overfetch(&self, limit: usize) -> usize {
        limit.saturating_mul(self.settings.overfetch_factor.max(1))
    }

    /// Lexical recall over content items.
    pub fn query(
        &self,
        text: &str,
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<FactBundle>> {
        let sources = self.backend.sources(selector, ctx)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut batches = Vec::with_capacity(sources.len());
        for source in &sources {
            batches.push(self.lexical(source, text, limit)?);
        }
        Ok(ranking::merge_by_priority(batches, limit))
    }

    fn lexical(&self, source: &Source<'_>, text: &str, limit: usize) -> Result<Vec<FactBundle>> {
        let fetch = self.overfetch(limit);
        source.storage.read(|tx| {
            let content = tx.search_content(text, &source.filter, fetch)?;
            let links = tx.facts_for_content(&content, &source.filter)?;
            let ids = ranking::walk_content(&content, &links, limit);
            debug!(
                scope = %source.filter.scope,
                content = content.len(),
                facts = ids.len(),
                "lexical candidates"
            );
            tx.load_bundles(&ids)
        })
    }

    /// Similarity recall, by embedding, by text or both.
    pub fn query_semantic(
        &self,
        text: &str,
        limit: usize,
        selector: ScopeSelector,
        mode: SemanticMode,
        ctx: &ScopeContext,
    ) -> Result<Vec<Hit>> {
        let sources = self.backend.sources(selector, ctx)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fetch = self.overfetch(limit);
        let query = self.embedder.embed(text);
        let mut hits = Vec::new();
        for source in &sources {
            if matches!(mode, SemanticMode::Vector | SemanticMode::Both) {
                let mut per_query = self.vector(source, std::slice::from_ref(&query), fetch)?;
                hits.extend(per_query.pop().unwrap_or_default());
            }
            if matches!(mode, SemanticMode::Text | SemanticMode::Both) {
                hits.extend(self.lexical(source, text, limit)?.into_iter().map(|bundle| Hit {
                    bundle,
                    score: self.settings.text_score,
                    origin: HitOrigin::Text,
                }));
            }
        }
        Ok(ranking::merge_scored(hits, limit))
    }

    /// Top `top` vector hits for each of `queries` from one source.
    ///
    /// Candidates and bundles are loaded once whatever the number of queries.
    fn vector(&self, source: &Source<'_>, queries: &[Vec<f32>], top: usize) -> Result<Vec<Vec<Hit>>> {
        source.storage.read(|tx| {
            let candidates =
                tx.embedding_candidates(&source.filter, self.settings.semantic_candidate_cap)?;
            let ranked: Vec<Vec<(Ulid, f32)>> = queries
                .iter()
                .map(|q| {
                    ranking::top_by_similarity(q, &candidates, self.settings.min_similarity, top)
                })
                .collect();

            let mut seen = HashSet::new();
            let ids: Vec<Ulid> = ranked
                .iter()
                .flatten()
                .map(|(id, _)| *id)
                .filter(|id| seen.insert(*id))
                .collect();
            debug!(
                scope = %source.filter.scope,
                candidates = candidates.len(),
                facts = ids.len(),
                "vector candidates"
            );

            let bundles: HashMap<Ulid, FactBundle> = tx
                .load_bundles(&ids)?
                .into_iter()
                .map(|b| (b.fact.id, b))
                .collect();

            Ok(ranked
                .into_iter()
                .map(|list| {
                    list.into_iter()
                        .filter_map(|(id, score)| {
                            bundles.get(&id).map(|bundle| Hit {
                                bundle: bundle.clone(),
                                score,
                                origin: HitOrigin::Vector,
                            })
                        })
                        .collect()
                })
                .collect())
        })
    }

    /// Facts relevant to every one of 2 to 5 concepts.
    pub fn query_concepts<S: AsRef<str>>(
        &self,
        concepts: &[S],
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<Hit>> {
        if !(MIN_CONCEPTS..=MAX_CONCEPTS).contains(&concepts.len()) {
            return Err(Error::validation(format!(
                "expected {MIN_CONCEPTS} to {MAX_CONCEPTS} concepts, got {}",
                concepts.len()
            )));
        }
        if concepts.iter().any(|c| c.as_ref().trim().is_empty()) {
            return Err(Error::validation("concepts must not be empty"));
        }
        let sources = self.backend.sources(selector, ctx)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let per_limit = limit.saturating_mul(self.settings.concept_overfetch.max(1));
        let queries: Vec<Vec<f32>> = concepts
            .iter()
            .map(|c| self.embedder.embed(c.as_ref()))
            .collect();

        let mut per_concept: Vec<Vec<Hit>> = vec![Vec::new(); queries.len()];
        for source in &sources {
            for (set, hits) in per_concept.iter_mut().zip(self.vector(source, &queries, per_limit)?) {
                set.extend(hits);
            }
        }
        let per_concept = per_concept
            .into_iter()
            .map(|hits| ranking::merge_scored(hits, per_limit))
            .collect();

        let mut out = ranking::intersect_concepts(per_concept);
        out.truncate(limit);
        Ok(out)
    }

    /// A fact with its receipts, supersession links and conflicts.
    pub fn explain(
        &self,
        fact_id: &Ulid,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Option<Explanation>> {
        let walk = self.settings.explain_walk_limit;
        for source in self.backend.sources(selector, ctx)? {
            let found = source.storage.read(|tx| {
                let Some(fact) = tx.get_fact(fact_id, &source.filter)? else {
                    return Ok(None);
                };
                Ok(Some(Explanation {
                    receipts: tx.receipts_for(&fact.id, walk)?,
                    supersedes: tx.superseded_facts(&fact.id, walk)?,
                    superseded_by: tx.superseding_facts(&fact.id, walk)?,
                    conflicts: tx.conflicts_for(&fact.id, walk)?,
                    fact,
                }))
            })?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Open conflicts in scope, newest first within each source.
    pub fn conflicts(&self, selector: ScopeSelector, ctx: &ScopeContext) -> Result<Vec<ConflictView>> {
        let mut views = Vec::new();
        let mut seen = HashSet::new();
        for source in self.backend.sources(selector, ctx)? {
            let batch = source.storage.read(|tx| {
                let conflicts = tx.open_conflicts(&source.filter)?;
                let mut ids = Vec::with_capacity(conflicts.len() * 2);
                for c in &conflicts {
                    for id in [c.fact_a_id, c.fact_b_id] {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
                let facts: HashMap<Ulid, Fact> = tx
                    .load_facts(&ids)?
                    .into_iter()
                    .map(|f| (f.id, f))
                    .collect();

                Ok(conflicts
                    .into_iter()
                    .filter_map(|conflict| {
                        let fact_a = facts.get(&conflict.fact_a_id)?.clone();
                        let fact_b = facts.get(&conflict.fact_b_id)?.clone();
                        Some(ConflictView {
                            conflict,
                            fact_a,
                            fact_b,
                        })
                    })
                    .collect::<Vec<_>>())
            })?;
            views.extend(batch.into_iter().filter(|v| seen.insert(v.conflict.id)));
        }
        Ok(views)
    }

    /// Facts created after `since`, any status, newest first.
    pub fn changes(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
        selector: ScopeSelector,
        ctx: &ScopeContext,
    ) -> Result<Vec<Fact>> {
        let mut batches = Vec::new();
        for source in self.backend.sources(selector, ctx)? {
            batches.push(
                source
                    .storage
                    .read(|tx| tx.changes_since(&source.filter, since, limit))?,
            );
        }
        Ok(ranking::merge_newest_first(batches, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embedding::testing::KeywordEmbedder;
    use crate::core::fact::{now, Status};
    use crate::core::resolver::{Candidate, Resolver, SlotKey};

    fn engine(backend: Backend) -> RecallEngine {
        RecallEngine::new(backend, Box::new(KeywordEmbedder), RecallSettings::default())
    }

    fn single() -> Result<RecallEngine> {
        Ok(engine(Backend::Single(Storage::open_memory()?)))
    }

    fn ctx() -> ScopeContext {
        ScopeContext::new("/work/repo")
    }

    fn put(engine: &RecallEngine, candidate: Candidate) -> Result<Ulid> {
        put_in(engine, candidate, &ctx())
    }

    /// Resolve straight through storage, embedding like `Memory` does.
    fn put_in(engine: &RecallEngine, candidate: Candidate, ctx: &ScopeContext) -> Result<Ulid> {
        let resolver = Resolver::default();
        let slot = SlotKey::for_candidate(&candidate, ctx)?;
        engine.backend().store(slot.scope).write(|tx| {
            let state = tx.slot_state(&slot)?;
            let mut ws = resolver.decide(&candidate, &slot, &state, now())?;
            if let Some(new_fact) = ws.new_fact.as_mut() {
                new_fact.embedding = Some(engine.embedder().embed(&new_fact.fact.embedding_text()));
            }
            tx.apply(&ws)?;
            Ok(ws.fact_id)
        })
    }

    fn note(subject: &str, object: &str, quote: &str) -> Candidate {
        Candidate::new(subject, "note", object).with_quote(quote)
    }

    #[test]
    fn test_query_count_is_independent_of_limit() -> Result<()> {
        let engine = single()?;
        for i in 0..30 {
            put(&engine, note("repo", &format!("database fact {i}"), &format!("database note {i}")))?;
        }

        let before = engine.backend().query_count();
        let small = engine.query("database", 1, ScopeSelector::All, &ctx())?;
        let small_cost = engine.backend().query_count() - before;

        let before = engine.backend().query_count();
        let large = engine.query("database", 25, ScopeSelector::All, &ctx())?;
        let large_cost = engine.backend().query_count() - before;

        assert_eq!(small.len(), 1);
        assert_eq!(large.len(), 25);
        assert_eq!(small_cost, large_cost);
        assert!(large_cost <= 8, "two sources, four statements each");
        Ok(())
    }

    #[test]
    fn test_query_is_deterministic() -> Result<()> {
        let engine = single()?;
        for i in 0..10 {
            put(&engine, note("repo", &format!("deploy step {i}"), "deploy to fly"))?;
        }
        let ids = |r: Vec<FactBundle>| r.into_iter().map(|b| b.fact.id).collect::<Vec<_>>();
        let a = ids(engine.query("deploy", 5, ScopeSelector::All, &ctx())?);
        let b = ids(engine.query("deploy", 5, ScopeSelector::All, &ctx())?);
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_query_merges_project_before_global() -> Result<()> {
        let engine = single()?;
        let global = put(&engine, note("me", "prefers rust", "I write rust").with_scope(Scope::Global))?;
        let project = put(&engine, note("repo", "is rust", "repo is rust"))?;
        let duplicate = put(&engine, note("repo", "is rust", "repo is rust").with_scope(Scope::Global))?;

        let hits = engine.query("rust", 10, ScopeSelector::All, &ctx())?;
        let ids: Vec<Ulid> = hits.iter().map(|b| b.fact.id).collect();
        assert_eq!(ids, vec![project, global]);
        assert!(!ids.contains(&duplicate));

        let global_only = engine.query("rust", 10, ScopeSelector::Global, &ctx())?;
        assert_eq!(global_only.len(), 2);
        Ok(())
    }

    #[test]
    fn test_project_scope_needs_path() -> Result<()> {
        let engine = single()?;
        put(&engine, note("me", "prefers rust", "rust").with_scope(Scope::Global))?;
        let err = engine
            .query("rust", 5, ScopeSelector::Project, &ScopeContext::global_only())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let hits = engine.query("rust", 5, ScopeSelector::All, &ScopeContext::global_only())?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[test]
    fn test_other_projects_are_invisible() -> Result<()> {
        let engine = single()?;
        put(&engine, note("repo", "is rust", "rust everywhere"))?;
        let hits = engine.query("rust", 5, ScopeSelector::All, &ScopeContext::new("/work/other"))?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[test]
    fn test_busy_neighbour_project_does_not_crowd_out_results() -> Result<()> {
        let engine = single()?;
        let other = ScopeContext::new("/work/other");
        for i in 0..5 {
            put_in(
                &engine,
                note("svc", &format!("database {i}"), "database database database"),
                &other,
            )?;
        }
        let mine = put(&engine, note("repo", "is postgres", "the database is postgres"))?;

        let hits = engine.query("database", 1, ScopeSelector::Project, &ctx())?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.id, mine);
        Ok(())
    }

    #[test]
    fn test_text_mode_matches_lexical_recall() -> Result<()> {
        let engine = single()?;
        for i in 0..12 {
            let quote = format!("{}note", "database ".repeat(i + 1));
            put(&engine, note("repo", &format!("fact {i}"), &quote))?;
        }

        let lexical: Vec<Ulid> = engine
            .query("database", 3, ScopeSelector::All, &ctx())?
            .into_iter()
            .map(|b| b.fact.id)
            .collect();
        let text: Vec<Ulid> = engine
            .query_semantic("database", 3, ScopeSelector::All, SemanticMode::Text, &ctx())?
            .into_iter()
            .map(|h| h.bundle.fact.id)
            .collect();
        assert_eq!(lexical.len(), 3);
        assert_eq!(text, lexical);
        Ok(())
    }

    #[test]
    fn test_semantic_modes() -> Result<()> {
        let engine = single()?;
        let jwt = put(&engine, note("api", "authentication via JWT", "we sign tokens"))?;
        let lexical = put(&engine, note("ops", "rotation schedule", "authentication keys rotate monthly"))?;

        let vector = engine.query_semantic("authentication", 10, ScopeSelector::All, SemanticMode::Vector, &ctx())?;
        assert_eq!(vector.len(), 1);
        assert_eq!(vector[0].bundle.fact.id, jwt);
        assert_eq!(vector[0].origin, HitOrigin::Vector);

        let text = engine.query_semantic("authentication", 10, ScopeSelector::All, SemanticMode::Text, &ctx())?;
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].bundle.fact.id, lexical);
        assert_eq!(text[0].score, 0.5);

        let both = engine.query_semantic("authentication", 10, ScopeSelector::All, SemanticMode::Both, &ctx())?;
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].bundle.fact.id, jwt);
        assert!(both[0].score > 0.5);
        Ok(())
    }

    #[test]
    fn test_concepts_exclude_single_topic_hits() -> Result<()> {
        let engine = single()?;
        let cookies = put(&engine, note("api", "authentication with session cookies", "login uses cookies"))?;
        let jwt = put(&engine, note("api", "authentication via JWT", "we sign JWT tokens"))?;
        put(&engine, note("repo", "database is PostgreSQL", "postgres"))?;

        let auth = engine.query_semantic("authentication", 5, ScopeSelector::All, SemanticMode::Vector, &ctx())?;
        assert!(auth.iter().any(|h| h.bundle.fact.id == cookies));

        let hits = engine.query_concepts(&["authentication", "JWT"], 5, ScopeSelector::All, &ctx())?;
        let ids: Vec<Ulid> = hits.iter().map(|h| h.bundle.fact.id).collect();
        assert_eq!(ids, vec![jwt]);
        assert_eq!(hits[0].origin, HitOrigin::Concepts);
        Ok(())
    }

    #[test]
    fn test_more_concepts_never_grow_the_result() -> Result<()> {
        let engine = single()?;
        put(&engine, note("api", "authentication via JWT", "a"))?;
        put(&engine, note("api", "JWT token rotation", "b"))?;
        put(&engine, note("api", "authentication JWT token session", "c"))?;

        let two = engine.query_concepts(&["authentication", "JWT"], 10, ScopeSelector::All, &ctx())?;
        let three = engine.query_concepts(&["authentication", "JWT", "token"], 10, ScopeSelector::All, &ctx())?;
        let four = engine.query_concepts(&["authentication", "JWT", "token", "session"], 10, ScopeSelector::All, &ctx())?;
        assert_eq!(two.len(), 2);
        assert!(three.len() <= two.len());
        assert!(four.len() <= three.len());
        assert_eq!(four.len(), 1);
        Ok(())
    }

    #[test]
    fn test_concept_count_is_validated() -> Result<()> {
        let engine = single()?;
        for concepts in [vec!["one"], vec!["a", "b", "c", "d", "e", "f"], vec!["a", " "]] {
            let err = engine
                .query_concepts(&concepts, 5, ScopeSelector::All, &ctx())
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{concepts:?}");
        }
        Ok(())
    }

    #[test]
    fn test_explain_and_missing_fact() -> Result<()> {
        let engine = single()?;
        let db = |o: &str| Candidate::new("repo", "uses_database", o).with_quote(format!("db is {o}"));
        let old = put(&engine, db("MySQL"))?;
        let new = put(&engine, db("PostgreSQL").with_signal(true))?;
        let rival = put(&engine, db("MongoDB"))?;

        let explained = engine
            .explain(&new, ScopeSelector::All, &ctx())?
            .expect("fact exists");
        assert_eq!(explained.fact.status, Status::Active);
        assert_eq!(explained.receipts.len(), 1);
        assert_eq!(explained.supersedes.iter().map(|f| f.id).collect::<Vec<_>>(), vec![old]);
        assert!(explained.superseded_by.is_empty());
        assert_eq!(explained.conflicts.len(), 1);
        assert_eq!(explained.conflicts[0].fact_b_id, rival);

        let old_explained = engine.explain(&old, ScopeSelector::All, &ctx())?.expect("kept");
        assert_eq!(old_explained.superseded_by[0].id, new);

        assert!(engine.explain(&Ulid::new(), ScopeSelector::All, &ctx())?.is_none());
        Ok(())
    }

    #[test]
    fn test_conflicts_and_changes() -> Result<()> {
        let engine = single()?;
        let db = |o: &str| Candidate::new("repo", "uses_database", o).with_quote(format!("db is {o}"));
        let holder = put(&engine, db("PostgreSQL"))?;
        std::thread::sleep(Duration::from_millis(2));
        let rival = put(&engine, db("MongoDB"))?;

        let conflicts = engine.conflicts(ScopeSelector::All, &ctx())?;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].fact_a.id, holder);
        assert_eq!(conflicts[0].fact_b.id, rival);
        assert_eq!(conflicts[0].fact_b.status, Status::Disputed);
        assert!(engine.conflicts(ScopeSelector::Global, &ctx())?.is_empty());

        let changes = engine.changes(None, 10, ScopeSelector::All, &ctx())?;
        assert_eq!(changes.iter().map(|f| f.id).collect::<Vec<_>>(), vec![rival, holder]);
        let latest = engine.changes(Some(changes[1].created_at), 10, ScopeSelector::All, &ctx())?;
        assert_eq!(latest.len(), 1);
        Ok(())
    }

    #[test]
    fn test_dual_backend_reads_both_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = engine(Backend::open_dual(
            &dir.path().join("project.db"),
            &dir.path().join("global.db"),
            Duration::from_millis(500),
        )?);
        put(&engine, note("repo", "deploys to fly", "deploy on fly"))?;
        put(&engine, note("me", "likes fly", "fly deploy habit").with_scope(Scope::Global))?;

        let Backend::Dual { project, global } = engine.backend() else {
            panic!("dual backend expected");
        };
        assert_eq!(project.stats(&ScopeFilter::project("/work/repo"))?.total_facts, 1);
        assert_eq!(global.stats(&ScopeFilter::global())?.total_facts, 1);

        let hits = engine.query("deploy", 10, ScopeSelector::All, &ctx())?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].fact.scope, Scope::Project);
        assert_eq!(hits[1].fact.scope, Scope::Global);
        Ok(())
    }
}
