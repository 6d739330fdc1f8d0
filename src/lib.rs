//! Opdeck — runtime-extensible data operations for operators.
//!
//! Operations are discovered from a registry, their parameters are bound by
//! name (cursor, collection, record ID, bulk rows, accumulator, free text),
//! and every execution commits or rolls back and releases its resources
//! exactly once. New script operations can be added at runtime.

pub mod audit;
pub mod cli;
pub mod core;
pub mod prompt;
pub mod resources;
pub mod transport;
