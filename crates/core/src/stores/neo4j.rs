use crate::models::{DocumentNode, GraphRecord};
use crate::traits::GraphStore;
use crate::{SearchError, Tag};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const UPSERT_DOCUMENT: &str = r#"
    MERGE (d:Document {source: $source})
    SET d.type = coalesce($type, 'unknown'),
        d.length = coalesce($length, 0),
        d.processed_at = datetime($processed_at)
    RETURN d.source AS source;
"#;

const TAG_DOCUMENT: &str = r#"
    MERGE (d:Document {source: $source})
      ON CREATE SET d.type = 'text/plain'
    WITH d
    UNWIND $tags AS tag
    MERGE (t:Tag {name: tag})
    MERGE (d)-[:HAS_TAG]->(t)
    RETURN count(t) AS tag_count;
"#;

const DOCUMENTS_BY_TAG: &str = r#"
    MATCH (d:Document)-[:HAS_TAG]->(t:Tag)
    WHERE toLower(t.name) CONTAINS toLower($tag)
    WITH DISTINCT d
    MATCH (d)-[:HAS_TAG]->(all:Tag)
    RETURN d.source AS source,
           d.type AS type,
           d.length AS length,
           toString(d.processed_at) AS processed_at,
           collect(DISTINCT all.name) AS tags
    ORDER BY source;
"#;

#[derive(Clone)]
pub struct Neo4jStore {
    endpoint: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client: Client::new(),
        }
    }

    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    /// Runs one statement in its own auto-committed transaction.
    pub async fn run(&self, statement: &str, parameters: Value) -> Result<Value, SearchError> {
        let response = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "statements": [
                    {
                        "statement": statement,
                        "parameters": parameters
                    }
                ]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "neo4j".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        if let Some(message) = first_error(&body) {
            return Err(SearchError::BackendResponse {
                backend: "neo4j".to_string(),
                details: message,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_document(&self, document: &DocumentNode) -> Result<(), SearchError> {
        self.run(
            UPSERT_DOCUMENT,
            json!({
                "source": document.source,
                "type": document.media_type,
                "length": document.length,
                "processed_at": document.processed_at.to_rfc3339(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn tag_document(&self, source: &str, tags: &[Tag]) -> Result<(), SearchError> {
        if tags.is_empty() {
            return Ok(());
        }

        self.run(TAG_DOCUMENT, json!({ "source": source, "tags": tags }))
            .await?;
        Ok(())
    }

    async fn documents_by_tag(&self, fragment: &str) -> Result<Vec<GraphRecord>, SearchError> {
        let body = self.run(DOCUMENTS_BY_TAG, json!({ "tag": fragment })).await?;
        Ok(extract_rows(&body).into_iter().filter_map(row_to_record).collect())
    }
}

fn first_error(payload: &Value) -> Option<String> {
    payload
        .pointer("/errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .map(|error| {
            let code = error.pointer("/code").and_then(Value::as_str).unwrap_or("unknown");
            let message = error.pointer("/message").and_then(Value::as_str).unwrap_or_default();
            format!("{code}: {message}")
        })
}

fn row_to_record(row: &Value) -> Option<GraphRecord> {
    let values = row.as_array()?;
    if values.len() < 5 {
        return None;
    }

    Some(GraphRecord {
        source: values[0].as_str().map(str::to_string),
        media_type: values[1].as_str().map(str::to_string),
        length: values[2].as_u64(),
        processed_at: values[3].as_str().map(str::to_string),
        tags: values[4]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn extract_rows(payload: &Value) -> Vec<&Value> {
    payload
        .pointer("/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| result.pointer("/data").and_then(Value::as_array))
                .flat_map(|rows| {
                    rows.iter().filter_map(|row_entry| {
                        row_entry
                            .pointer("/row")
                            .or(Some(row_entry))
                            .filter(|candidate| candidate.is_array())
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
