pub mod fs;
pub mod memory;
pub mod neo4j;
pub mod qdrant;

pub use fs::FsTextStore;
pub use memory::{MemoryGraphStore, MemoryTextStore, MemoryVectorStore};
pub use neo4j::Neo4jStore;
pub use qdrant::QdrantStore;
