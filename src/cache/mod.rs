//! Cache implementation modules
//!
//! Leaf-first: errors and config, the content-type policy table, the
//! single-flight registry, then the three tiers. The orchestrator that ties
//! them together lives in `crate::multi_layer`.

pub mod config;
pub mod error;
pub mod policy;
pub mod singleflight;
pub mod tier;
