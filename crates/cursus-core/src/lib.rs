//! cursus-core: academic evaluation engine, cohort statistics and insight
//! plumbing.
//!
//! This crate defines the data model, the evaluator rules, the deliberation
//! board, the cohort file format and the insight provider trait that the
//! rest of cursus builds on.

pub mod error;
pub mod evaluator;
pub mod insight;
pub mod model;
pub mod parser;
pub mod report;
pub mod statistics;
pub mod traits;
