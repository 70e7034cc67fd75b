//! Typed records for both sides of the transcoding.
//!
//! # Responsibility
//! - Define normalized input records and graph output rows.
//! - Own the type taxonomy that every numeric code comes from.
//!
//! # Invariants
//! - Every graph row kind is a taxonomy enum, never a literal integer.

pub mod graph;
pub mod norm;
pub mod taxonomy;
