//! Use-case services over the two stores.
//!
//! # Responsibility
//! - Orchestrate repository, encoder and policy calls into whole runs.
//! - Own the transaction boundary of each run.

pub mod import_service;
pub mod transcode_service;
