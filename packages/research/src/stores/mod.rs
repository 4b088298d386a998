//! Storage implementations for the evidence cache.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage for tests
//! - `FileStore` - Per-project directory of plain files

pub mod fs;
pub mod memory;

pub use fs::FileStore;
pub use memory::MemoryStore;
