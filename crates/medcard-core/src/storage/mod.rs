//! Storage collaborators for wrapped keys and client salts
//!
//! This module provides two backends implementing both traits:
//! 1. In-memory (tests and embedding)
//! 2. JSON file (the operator CLI)

mod file;
mod memory;
mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{SaltStore, UserKeyStore};
