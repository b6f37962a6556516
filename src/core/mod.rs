//! Core module - Business logic
//!
//! Contains the fact model, the resolver and the recall engine. Nothing in
//! here reads the working directory or the environment.

pub mod error;
pub mod fact;
pub mod policy;
pub mod resolver;
pub mod embedding;
pub mod retry;
pub mod storage;
pub mod ranking;
pub mod recall;
pub mod memory;
