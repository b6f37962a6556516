//! factkeep - fact resolution and recall
//!
//! Turns extracted statements into a consistent, auditable set of facts and
//! answers queries over them.
//!
//! ## Key Concepts
//!
//! - **Slots**: `(scope, project path, subject, predicate)`; an exclusive
//!   slot holds at most one active fact
//! - **Append-only history**: replaced facts are retired and linked with
//!   `supersedes`, never deleted
//! - **Two scopes**: project facts outrank global facts on recall
//! - **Receipts**: every fact cites the content it came from

pub mod cli;
pub mod config;
pub mod core;

pub use crate::core::error::{Error, Result};
pub use crate::core::fact::{Fact, Scope, ScopeContext, ScopeSelector};
pub use crate::core::memory::Memory;
pub use crate::core::recall::{Backend, RecallEngine, RecallSettings};
pub use crate::core::resolver::{Candidate, ResolveOutcome, Resolver};
pub use crate::core::storage::Storage;
