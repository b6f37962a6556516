//! Ranking - merge and ordering primitives
//!
//! Pure functions over already-loaded results. Every ordering ends in a
//! total tie-break on fact id, so the same store contents always produce the
//! same output.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::embedding::cosine_similarity;
use super::fact::{Fact, FactBundle, Signature, Status};

/// Anything that carries a fact
pub trait HasFact {
    fn fact(&self) -> &Fact;
}

impl HasFact for Fact {
    fn fact(&self) -> &Fact {
        self
    }
}

impl HasFact for FactBundle {
    fn fact(&self) -> &Fact {
        &self.fact
    }
}

/// Where a scored result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitOrigin {
    /// Cosine similarity against the query embedding
    Vector,
    /// Lexical match, carrying the neutral text score
    Text,
    /// Mean similarity across concepts
    Concepts,
}

impl std::fmt::Display for HitOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HitOrigin::Vector => "vector",
            HitOrigin::Text => "text",
            HitOrigin::Concepts => "concepts",
        };
        f.write_str(s)
    }
}

/// Scored recall result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(flatten)]
    pub bundle: FactBundle,
    pub score: f32,
    pub origin: HitOrigin,
}

impl HasFact for Hit {
    fn fact(&self) -> &Fact {
        &self.bundle.fact
    }
}

/// `(source priority, created_at, id)`: project before global, older first.
fn priority_key(fact: &Fact) -> (u8, DateTime<Utc>, Ulid) {
    (fact.scope.priority(), fact.created_at, fact.id)
}

/// Whether a fact should yield to an active copy of the same statement.
fn not_active(fact: &Fact) -> bool {
    fact.status != Status::Active
}

/// Keep one item per signature: the one with the smallest `rank`, the
/// earliest on ties. Survivors keep their input order.
pub fn dedupe_by_signature<T: HasFact, K: Ord>(items: Vec<T>, rank: impl Fn(&T) -> K) -> Vec<T> {
    let mut winners: HashMap<Signature, (K, usize)> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        let key = (rank(item), i);
        match winners.entry(item.fact().signature()) {
            Entry::Occupied(mut e) => {
                if key < *e.get() {
                    e.insert(key);
                }
            }
            Entry::Vacant(e) => {
                e.insert(key);
            }
        }
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(i, item)| winners.get(&item.fact().signature()).map(|w| w.1) == Some(*i))
        .map(|(_, item)| item)
        .collect()
}

/// Resolve FTS content hits to fact ids.
///
/// Walks `content_order` (best match first) and, for each content item, the
/// facts that cite it in `links` order. First sighting of a fact wins; the
/// walk stops at `cap` facts.
pub fn walk_content(content_order: &[Ulid], links: &[(Ulid, Ulid)], cap: usize) -> Vec<Ulid> {
    let mut by_content: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
    for (content, fact) in links {
        by_content.entry(*content).or_default().push(*fact);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for content in content_order {
        for fact in by_content.get(content).into_iter().flatten() {
            if out.len() >= cap {
                return out;
            }
            if seen.insert(*fact) {
                out.push(*fact);
            }
        }
    }
    out
}

/// Merge per-source batches for lexical recall.
///
/// Ordered by source priority, then age, then id; a signature seen in a
/// higher-priority source hides later copies. Within one source an active
/// copy hides disputed or proposed ones.
pub fn merge_by_priority<T: HasFact>(batches: Vec<Vec<T>>, limit: usize) -> Vec<T> {
    let mut all: Vec<T> = batches.into_iter().flatten().collect();
    all.sort_by(|a, b| priority_key(a.fact()).cmp(&priority_key(b.fact())));
    let mut merged =
        dedupe_by_signature(all, |item| (item.fact().scope.priority(), not_active(item.fact())));
    merged.truncate(limit);
    merged
}

/// Merge per-source batches newest first (change feeds).
///
/// Signature dedupe still prefers the higher-priority source.
pub fn merge_newest_first<T: HasFact>(batches: Vec<Vec<T>>, limit: usize) -> Vec<T> {
    let mut merged = merge_by_priority(batches, usize::MAX);
    merged.sort_by(|a, b| {
        let (a, b) = (a.fact(), b.fact());
        b.created_at
            .cmp(&a.created_at)
            .then(a.scope.priority().cmp(&b.scope.priority()))
            .then(b.id.cmp(&a.id))
    });
    merged.truncate(limit);
    merged
}

/// Score candidates against `query` and keep the best `k` at or above `min_similarity`.
///
/// Equal scores keep candidate order.
pub fn top_by_similarity(
    query: &[f32],
    candidates: &[(Ulid, Vec<f32>)],
    min_similarity: f32,
    k: usize,
) -> Vec<(Ulid, f32)> {
    let mut scored: Vec<(Ulid, f32)> = candidates
        .iter()
        .filter_map(|(id, vec)| {
            cosine_similarity(query, vec)
                .filter(|s| *s >= min_similarity)
                .map(|s| (*id, s))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

fn by_score(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| priority_key(a.fact()).cmp(&priority_key(b.fact())))
}

/// Merge scored hits from every source and path.
///
/// A fact found by both paths keeps its vector hit, whatever the text
/// score. Then: score descending, source priority, signature dedupe, `limit`.
pub fn merge_scored(hits: Vec<Hit>, limit: usize) -> Vec<Hit> {
    let mut best: Vec<Hit> = Vec::with_capacity(hits.len());
    let mut index: HashMap<Ulid, usize> = HashMap::new();
    for hit in hits {
        match index.get(&hit.bundle.fact.id) {
            Some(&i) => {
                let kept = &best[i];
                let replace = match (kept.origin, hit.origin) {
                    (HitOrigin::Text, HitOrigin::Vector) => true,
                    (HitOrigin::Vector, HitOrigin::Text) => false,
                    _ => hit.score > kept.score,
                };
                if replace {
                    best[i] = hit;
                }
            }
            None => {
                index.insert(hit.bundle.fact.id, best.len());
                best.push(hit);
            }
        }
    }

    best.sort_by(by_score);
    let mut merged =
        dedupe_by_signature(best, |hit| (hit.fact().scope.priority(), not_active(hit.fact())));
    merged.truncate(limit);
    merged
}

/// AND across concepts: keep results present in every concept's set.
///
/// Identity is the fact signature, so copies of one statement from
/// different stores count as the same result. The score is the mean of the
/// per-concept scores; ties keep the first concept's order.
pub fn intersect_concepts(per_concept: Vec<Vec<Hit>>) -> Vec<Hit> {
    let mut sets = per_concept.into_iter();
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    let others: Vec<HashMap<Signature, f32>> = sets
        .map(|hits| {
            let mut scores = HashMap::new();
            for hit in hits {
                scores.entry(hit.fact().signature()).or_insert(hit.score);
            }
            scores
        })
        .collect();

    let count = (others.len() + 1) as f32;
    let mut out: Vec<Hit> = first
        .into_iter()
        .filter_map(|mut hit| {
            let signature = hit.fact().signature();
            let mut total = hit.score;
            for scores in &others {
                total += scores.get(&signature)?;
            }
            hit.score = total / count;
            hit.origin = HitOrigin::Concepts;
            Some(hit)
        })
        .collect();

    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out
}
