//! Stream binding for flowline.
//!
//! Turns descriptor strings into byte endpoints and moves records between
//! those endpoints and bounded record channels.

/// Binding descriptors to named record channels.
pub mod bind;
/// Stream binding options.
pub mod config;
/// Descriptor string parsing.
pub mod descriptor;
/// Byte endpoints with null fallbacks.
pub mod endpoint;
/// Reader and writer pumps.
pub mod pump;
