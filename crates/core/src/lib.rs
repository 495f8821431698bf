pub mod chunking;
pub mod completion;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod tags;
pub mod traits;
pub mod vector;

#[cfg(test)]
mod test_support;

pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use completion::{Completion, CompletionProvider, OpenAiCompletion, ResponseFormat};
pub use embeddings::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CompletionError, IngestError, SearchError};
pub use extractor::{
    ExtractionStrategy, ExtractorRegistry, PdfTextExtractor, PlainTextExtractor,
    RemoteEndpointConfig, RemoteExtractor, TextExtractor,
};
pub use graph::GraphRetriever;
pub use ingest::{
    discover_files, guess_media_type, text_file_name, IngestionOutcome, IngestionPipeline,
};
pub use models::{
    Chunk, ChunkMetadata, Distance, DocumentNode, EvidenceBlock, EvidenceBundle, GraphRecord,
    IngestionOptions, MediaFamily, Origin, QueryOptions, RetrievalResult, Upload, VectorMatch,
    VectorPoint, TEXT_MEDIA_TYPE,
};
pub use orchestrator::{build_synthesis_prompt, load_evidence, Answer, SearchCoordinator};
pub use stores::{FsTextStore, MemoryGraphStore, MemoryTextStore, MemoryVectorStore, Neo4jStore, QdrantStore};
pub use tags::{Tag, TagExtraction, TagExtractor, TagMode};
pub use traits::{GraphStore, TextStore, VectorStore};
pub use vector::VectorRetriever;
