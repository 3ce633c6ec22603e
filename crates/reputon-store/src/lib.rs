// crates/reputon-store/src/lib.rs
//
// reputon-store: Persisted state for the Reputon protocol.
//
// Provides a directory of flat JSON files (the production backend) and an
// in-memory store for tests, both implementing `reputon_core::StateStore`.
// Every record is rewritten wholesale; a record that is missing or cannot
// be parsed reads back as empty.

pub mod files;
pub mod json;
pub mod memory;

// Re-export key types for ergonomic access from downstream crates.
pub use files::StateFile;
pub use json::JsonFileStore;
pub use memory::InMemoryStore;
