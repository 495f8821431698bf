use crate::tags::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Every chunk is stored as plain text once extraction has run.
pub const TEXT_MEDIA_TYPE: &str = "text/plain";

/// Metadata shared by every chunk produced from one upload. It is stored
/// verbatim as the vector payload and mirrored onto the graph Document node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub media_type: String,
    /// Character count of the whole extracted text, not of the chunk.
    pub length: usize,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn payload(&self) -> Value {
        let mut payload = serde_json::to_value(&self.metadata).unwrap_or(Value::Null);
        if let Value::Object(fields) = &mut payload {
            fields.insert("content".to_string(), Value::String(self.content.clone()));
        }
        payload
    }
}

/// One uploaded artifact, as handed over by the upload surface.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub declared_media_type: String,
}

impl Upload {
    pub fn new(
        bytes: Vec<u8>,
        original_name: impl Into<String>,
        declared_media_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            original_name: original_name.into(),
            declared_media_type: declared_media_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaFamily {
    Image,
    Audio,
    Pdf,
    Text,
}

impl MediaFamily {
    pub fn from_declared(media_type: &str) -> Self {
        let lowered = media_type.trim().to_ascii_lowercase();
        if lowered.starts_with("image") {
            MediaFamily::Image
        } else if lowered.starts_with("audio") {
            MediaFamily::Audio
        } else if lowered == "application/pdf" {
            MediaFamily::Pdf
        } else {
            MediaFamily::Text
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaFamily::Image => "image",
            MediaFamily::Audio => "audio",
            MediaFamily::Pdf => "pdf",
            MediaFamily::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Distance {
    Cosine,
    #[default]
    Dot,
    Euclid,
}

impl Distance {
    pub fn as_qdrant(self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

/// Properties written onto a graph Document node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentNode {
    pub source: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub length: usize,
    pub processed_at: DateTime<Utc>,
}

impl From<&ChunkMetadata> for DocumentNode {
    fn from(value: &ChunkMetadata) -> Self {
        Self {
            source: value.source.clone(),
            media_type: value.media_type.clone(),
            length: value.length,
            processed_at: value.processed_at,
        }
    }
}

/// A Document matched through a tag lookup, with every tag attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRecord {
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub length: Option<u64>,
    pub processed_at: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Origin {
    Vector { point_id: String, score: f64 },
    Graph { matched_tag: Tag, tags: Vec<String> },
}

/// A request-scoped hit from either backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub source: Option<String>,
    pub media_type: Option<String>,
    pub origin: Origin,
}

impl RetrievalResult {
    pub fn matched_tag(&self) -> Option<&Tag> {
        match &self.origin {
            Origin::Graph { matched_tag, .. } => Some(matched_tag),
            Origin::Vector { .. } => None,
        }
    }

    /// Missing types are treated as text, matching how chunks are written.
    pub fn is_text(&self) -> bool {
        self.media_type.as_deref().unwrap_or(TEXT_MEDIA_TYPE) == TEXT_MEDIA_TYPE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceBlock {
    pub source: String,
    pub text: String,
    pub loaded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceBundle {
    pub vector: Vec<EvidenceBlock>,
    pub graph: Vec<EvidenceBlock>,
}

impl EvidenceBundle {
    pub fn vector_text(&self) -> String {
        join_blocks(&self.vector)
    }

    pub fn graph_text(&self) -> String {
        join_blocks(&self.graph)
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty() && self.graph.is_empty()
    }
}

fn join_blocks(blocks: &[EvidenceBlock]) -> String {
    blocks
        .iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    /// How many leading chunks feed the document tagging sample.
    pub tag_sample_chunks: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 50,
            tag_sample_chunks: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub vector_limit: usize,
    pub evidence_max_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            vector_limit: 5,
            evidence_max_chars: 2_000,
        }
    }
}
