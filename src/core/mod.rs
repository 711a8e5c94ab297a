//! Core synthesis logic: types, registry, resolution, validation, planning.

pub mod composer;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod parser;
pub mod planner;
pub mod reference;
pub mod registry;
pub mod store;
pub mod synth;
pub mod types;
pub mod validator;
