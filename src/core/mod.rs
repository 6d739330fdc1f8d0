//! Core logic — definitions, registry, binding, execution, augmentation.

pub mod augment;
pub mod builtin;
pub mod codegen;
pub mod config;
pub mod error;
pub mod executor;
pub mod operation;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod script;
pub mod session;
pub mod state;
pub mod types;
