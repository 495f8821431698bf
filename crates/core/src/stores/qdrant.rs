use crate::models::{Distance, VectorMatch, VectorPoint};
use crate::traits::VectorStore;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::info;

#[derive(Clone)]
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    fn backend_error(details: impl Into<String>) -> SearchError {
        SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: details.into(),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            let created = self
                .client
                .put(self.collection_url())
                .json(&json!({
                    "vectors": {
                        "size": dimensions,
                        "distance": distance.as_qdrant(),
                    }
                }))
                .send()
                .await?;

            if !created.status().is_success() {
                return Err(Self::backend_error(format!(
                    "collection create returned {}",
                    created.status()
                )));
            }

            info!(collection = %self.collection, dimensions, "qdrant collection created");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        let body: Value = response.json().await?;
        match stored_vector_size(&body) {
            Some(actual) if actual != dimensions => Err(SearchError::DimensionMismatch {
                collection: self.collection.clone(),
                expected: dimensions,
                actual,
            }),
            Some(_) => Ok(()),
            None => Err(Self::backend_error(
                "collection info has no single vector size",
            )),
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), SearchError> {
        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits.iter().map(parse_match).collect())
    }
}

fn stored_vector_size(body: &Value) -> Option<usize> {
    body.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
}

fn parse_match(hit: &Value) -> VectorMatch {
    let id = match hit.pointer("/id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => String::new(),
    };

    VectorMatch {
        id,
        score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
        payload: hit.pointer("/payload").cloned().unwrap_or(Value::Null),
    }
}
