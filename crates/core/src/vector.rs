use crate::embeddings::Embedder;
use crate::models::{Chunk, Distance, Origin, RetrievalResult, VectorMatch, VectorPoint};
use crate::traits::VectorStore;
use crate::SearchError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

/// Embeds chunks and queries with one embedder and keeps them in one collection.
#[derive(Clone)]
pub struct VectorRetriever<V, E> {
    store: V,
    embedder: E,
    distance: Distance,
    ready: Arc<OnceCell<()>>,
}

impl<V, E> VectorRetriever<V, E>
where
    V: VectorStore,
    E: Embedder,
{
    pub fn new(store: V, embedder: E, distance: Distance) -> Self {
        Self {
            store,
            embedder,
            distance,
            ready: Arc::new(OnceCell::new()),
        }
    }

    /// Creates the collection on first use; later calls are no-ops.
    pub async fn ensure_ready(&self) -> Result<(), SearchError> {
        self.ready
            .get_or_try_init(|| async {
                self.store
                    .ensure_collection(self.embedder.dimensions(), self.distance)
                    .await
            })
            .await?;
        Ok(())
    }

    /// Returns the point ids in chunk order.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<Vec<Uuid>, SearchError> {
        self.ensure_ready().await?;

        let points: Vec<VectorPoint> = chunks
            .iter()
            .map(|chunk| VectorPoint {
                id: chunk.id,
                vector: self.embedder.embed(&chunk.content),
                payload: chunk.payload(),
            })
            .collect();
        let ids = points.iter().map(|point| point.id).collect();

        self.store.upsert(points).await?;
        info!(chunk_count = chunks.len(), "chunks indexed");
        Ok(ids)
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        self.ensure_ready().await?;

        let vector = self.embedder.embed(query);
        let matches = self.store.query(&vector, limit).await?;
        debug!(hits = matches.len(), limit, "vector search finished");

        Ok(matches.into_iter().map(to_result).collect())
    }
}

fn to_result(hit: VectorMatch) -> RetrievalResult {
    let field = |name: &str| {
        hit.payload
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    RetrievalResult {
        source: field("source"),
        media_type: field("type"),
        origin: Origin::Vector {
            point_id: hit.id.clone(),
            score: hit.score,
        },
    }
}
