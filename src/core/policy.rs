//! Predicate policy
//!
//! Static classification of predicates into exclusive (one active value per
//! slot) and multi-value (accumulating). Unknown predicates are multi-value:
//! accumulating never silently replaces anything.

use std::collections::HashMap;

use super::fact::normalize_predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub cardinality: Cardinality,
    pub exclusive: bool,
}

impl Classification {
    pub const EXCLUSIVE: Classification = Classification {
        cardinality: Cardinality::Single,
        exclusive: true,
    };

    pub const MULTI: Classification = Classification {
        cardinality: Cardinality::Multi,
        exclusive: false,
    };
}

const EXCLUSIVE_PREDICATES: &[&str] = &[
    "uses_database",
    "deployment_platform",
    "primary_language",
    "package_manager",
    "build_tool",
    "test_framework",
    "ci_provider",
    "license",
    "runtime_version",
    "hosting_provider",
];

const MULTI_PREDICATES: &[&str] = &[
    "convention",
    "decision",
    "preference",
    "dependency",
    "constraint",
    "note",
];

/// Predicate → classification table
#[derive(Debug, Clone)]
pub struct PredicatePolicy {
    table: HashMap<String, Classification>,
}

impl PredicatePolicy {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        for p in EXCLUSIVE_PREDICATES {
            table.insert((*p).to_string(), Classification::EXCLUSIVE);
        }
        for p in MULTI_PREDICATES {
            table.insert((*p).to_string(), Classification::MULTI);
        }
        Self { table }
    }

    /// Built-in table plus configured additions (later entries win).
    pub fn with_overrides(exclusive: &[String], multi: &[String]) -> Self {
        let mut policy = Self::new();
        for p in exclusive {
            policy
                .table
                .insert(normalize_predicate(p), Classification::EXCLUSIVE);
        }
        for p in multi {
            policy.table.insert(normalize_predicate(p), Classification::MULTI);
        }
        policy
    }

    pub fn classify(&self, predicate: &str) -> Classification {
        self.table
            .get(&normalize_predicate(predicate))
            .copied()
            .unwrap_or(Classification::MULTI)
    }
}

impl Default for PredicatePolicy {
    fn default() -> Self {
        Self::new()
    }
}
