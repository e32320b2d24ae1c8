//! Flowline core library providing the building blocks of the flow runner.
//!
//! This crate contains the flow registry, config resolution with cascading
//! override rules, record codecs and the traits every flow and pipeline task
//! implements.

/// Named record codecs and the codec registry.
pub mod codec;
/// Flow traits, record channels and the per-invocation flow context.
pub mod flow;
/// Dotted-path registry of flow definitions.
pub mod registry;
/// Config resolution from profile defaults and override rules.
pub mod resolve;
/// Process-scoped runtime holding all registries.
pub mod runtime;
/// Specificity scoring of glob patterns.
pub mod specificity;
/// Task execution framework.
pub mod task {
    /// Base runner trait for all task implementations.
    pub mod runner;
}
/// Helpers over JSON value trees.
pub mod value;
