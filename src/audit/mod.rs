//! Audit — append-only journal of augmentations and executions, BLAKE3 definition hashes.

pub mod eventlog;
pub mod hasher;
