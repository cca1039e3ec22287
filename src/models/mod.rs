//! Core data models for the rural-property registry service.
//!
//! These entities represent the logical structure of registered properties,
//! their derived statistics, and asynchronous analysis results. They map
//! cleanly to database tables via `sqlx::FromRow` and serialize naturally
//! as JSON via `serde`.

pub mod analysis;
pub mod payloads;
pub mod property;
pub mod stats;
