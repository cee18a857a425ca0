//! Core data models for the transfer engine and its manifest.
//!
//! `bucket`, `object` and `multipart` are rows of the local object store's
//! SQLite metadata and derive `sqlx::FromRow`. `tracked_file` is the persisted
//! manifest document. `transfer` holds the ephemeral per-call job state.

pub mod bucket;
pub mod multipart;
pub mod object;
pub mod tracked_file;
pub mod transfer;
