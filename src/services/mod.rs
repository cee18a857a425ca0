//! Transfer services: the store contract and its two backends, the chunked
//! engine, the multipart coordinator, the manifest and the orchestrator that
//! ties them together.

pub mod local_store;
pub mod manifest_store;
#[cfg(test)]
pub mod memory_store;
pub mod multipart;
pub mod orchestrator;
pub mod progress;
pub mod remote_store;
pub mod transfer_engine;
