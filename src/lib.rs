//! Stackweld: multi-provider infrastructure synthesis.
//!
//! Typed resource declarations across `aws`, `google`, and `docker` become a
//! validated dependency graph and a deterministic, provider-partitioned
//! deployment plan. Nothing is applied here: plans are handed to an
//! external executor as JSON.

pub mod cli;
pub mod core;
