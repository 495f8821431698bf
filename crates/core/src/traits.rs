use crate::models::{DocumentNode, Distance, GraphRecord, VectorMatch, VectorPoint};
use crate::{SearchError, Tag};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection when missing. An existing collection with a
    /// different dimensionality is a [`SearchError::DimensionMismatch`].
    async fn ensure_collection(
        &self,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), SearchError>;

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), SearchError>;

    /// Nearest points first.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>, SearchError>;
}

/// Graph writes have MERGE semantics: repeating them never duplicates
/// nodes or edges.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_document(&self, document: &DocumentNode) -> Result<(), SearchError>;

    async fn tag_document(&self, source: &str, tags: &[Tag]) -> Result<(), SearchError>;

    /// Documents linked to any tag whose name contains `fragment`, ignoring case.
    async fn documents_by_tag(&self, fragment: &str) -> Result<Vec<GraphRecord>, SearchError>;
}

/// Durable storage for extracted text, addressed by file name.
#[async_trait]
pub trait TextStore: Send + Sync {
    /// Stores `text` under `name`, replacing any earlier content, and returns
    /// the canonical source identifier.
    async fn write(&self, name: &str, text: &str) -> std::io::Result<String>;

    async fn read(&self, source: &str) -> std::io::Result<String>;
}
