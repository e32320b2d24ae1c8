//! Flowline application layer.
//!
//! Parses the command line, loads configuration, assembles the pipeline for
//! the selected flow and ships the built-in flows.

/// Application runner.
pub mod app;
/// Command-line argument tree.
pub mod cli;
/// Application configuration loading.
pub mod config;
/// Built-in flows.
pub mod flows;
/// Usage listings and flow help.
pub mod help;
/// Pipeline assembly and the run state machine.
pub mod pipeline;
