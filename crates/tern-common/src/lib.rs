//! Shared building blocks for the tern agent crates.

pub mod error;
pub mod paths;
pub mod persist;
