//! Process-local implementations of the store traits, with the same
//! idempotent upsert behavior as the remote backends.

use crate::models::{DocumentNode, Distance, GraphRecord, VectorMatch, VectorPoint};
use crate::traits::{GraphStore, TextStore, VectorStore};
use crate::{SearchError, Tag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collection {
    config: Option<(usize, Distance)>,
    points: Vec<VectorPoint>,
}

#[derive(Clone, Default)]
pub struct MemoryVectorStore {
    name: String,
    inner: Arc<RwLock<Collection>>,
}

impl MemoryVectorStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.points.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn missing(&self) -> SearchError {
        SearchError::BackendResponse {
            backend: "memory".to_string(),
            details: format!("collection `{}` does not exist", self.name),
        }
    }

    fn check_dimensions(&self, stored: usize, given: usize) -> Result<(), SearchError> {
        if stored == given {
            return Ok(());
        }
        Err(SearchError::DimensionMismatch {
            collection: self.name.clone(),
            expected: given,
            actual: stored,
        })
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), SearchError> {
        let mut collection = self.inner.write().await;
        match collection.config {
            Some((stored, _)) if stored != dimensions => Err(SearchError::DimensionMismatch {
                collection: self.name.clone(),
                expected: dimensions,
                actual: stored,
            }),
            Some(_) => Ok(()),
            None => {
                collection.config = Some((dimensions, distance));
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), SearchError> {
        let mut collection = self.inner.write().await;
        let (dimensions, _) = collection.config.ok_or_else(|| self.missing())?;

        for point in points {
            self.check_dimensions(dimensions, point.vector.len())?;
            match collection.points.iter_mut().find(|stored| stored.id == point.id) {
                Some(stored) => *stored = point,
                None => collection.points.push(point),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>, SearchError> {
        let collection = self.inner.read().await;
        let (dimensions, distance) = collection.config.ok_or_else(|| self.missing())?;
        self.check_dimensions(dimensions, vector.len())?;

        let mut scored: Vec<VectorMatch> = collection
            .points
            .iter()
            .map(|point| VectorMatch {
                id: point.id.to_string(),
                score: similarity(distance, vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        match distance {
            Distance::Euclid => scored.sort_by(|left, right| left.score.total_cmp(&right.score)),
            Distance::Cosine | Distance::Dot => {
                scored.sort_by(|left, right| right.score.total_cmp(&left.score))
            }
        }
        scored.truncate(limit);
        Ok(scored)
    }
}

fn similarity(distance: Distance, left: &[f32], right: &[f32]) -> f64 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    match distance {
        Distance::Dot => dot as f64,
        Distance::Cosine => {
            let norm = |values: &[f32]| values.iter().map(|v| v * v).sum::<f32>().sqrt();
            let denominator = norm(left) * norm(right);
            if denominator > 0.0 {
                (dot / denominator) as f64
            } else {
                0.0
            }
        }
        Distance::Euclid => left
            .iter()
            .zip(right)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt() as f64,
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    source: String,
    media_type: String,
    length: Option<u64>,
    processed_at: Option<String>,
}

#[derive(Default)]
struct Graph {
    documents: Vec<StoredDocument>,
    tags: Vec<String>,
    edges: Vec<(String, String)>,
}

impl Graph {
    fn merge_document(&mut self, source: &str) -> &mut StoredDocument {
        let position = match self.documents.iter().position(|doc| doc.source == source) {
            Some(position) => position,
            None => {
                self.documents.push(StoredDocument {
                    source: source.to_string(),
                    media_type: crate::TEXT_MEDIA_TYPE.to_string(),
                    length: None,
                    processed_at: None,
                });
                self.documents.len() - 1
            }
        };
        &mut self.documents[position]
    }
}

#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<RwLock<Graph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn tag_count(&self) -> usize {
        self.inner.read().await.tags.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }

    pub async fn tags_of(&self, source: &str) -> Vec<String> {
        let graph = self.inner.read().await;
        graph
            .edges
            .iter()
            .filter(|(doc, _)| doc == source)
            .map(|(_, tag)| tag.clone())
            .collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_document(&self, document: &DocumentNode) -> Result<(), SearchError> {
        let mut graph = self.inner.write().await;
        let stored = graph.merge_document(&document.source);
        stored.media_type = document.media_type.clone();
        stored.length = Some(document.length as u64);
        stored.processed_at = Some(document.processed_at.to_rfc3339());
        Ok(())
    }

    async fn tag_document(&self, source: &str, tags: &[Tag]) -> Result<(), SearchError> {
        if tags.is_empty() {
            return Ok(());
        }

        let mut graph = self.inner.write().await;
        graph.merge_document(source);
        for tag in tags {
            let name = tag.as_str().to_string();
            if !graph.tags.contains(&name) {
                graph.tags.push(name.clone());
            }
            let edge = (source.to_string(), name);
            if !graph.edges.contains(&edge) {
                graph.edges.push(edge);
            }
        }
        Ok(())
    }

    async fn documents_by_tag(&self, fragment: &str) -> Result<Vec<GraphRecord>, SearchError> {
        let needle = fragment.to_lowercase();
        let graph = self.inner.read().await;

        let records = graph
            .documents
            .iter()
            .filter_map(|doc| {
                let tags: Vec<String> = graph
                    .edges
                    .iter()
                    .filter(|(source, _)| *source == doc.source)
                    .map(|(_, tag)| tag.clone())
                    .collect();

                tags.iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
                    .then(|| GraphRecord {
                        source: Some(doc.source.clone()),
                        media_type: Some(doc.media_type.clone()),
                        length: doc.length,
                        processed_at: doc.processed_at.clone(),
                        tags,
                    })
            })
            .collect();

        Ok(records)
    }
}

#[derive(Clone, Default)]
pub struct MemoryTextStore {
    files: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryTextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextStore for MemoryTextStore {
    async fn write(&self, name: &str, text: &str) -> std::io::Result<String> {
        self.files
            .write()
            .await
            .insert(name.to_string(), text.to_string());
        Ok(name.to_string())
    }

    async fn read(&self, source: &str) -> std::io::Result<String> {
        self.files.read().await.get(source).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no stored text named {source}"),
            )
        })
    }
}
