use crate::chunking::build_chunks;
use crate::completion::CompletionProvider;
use crate::embeddings::Embedder;
use crate::extractor::ExtractorRegistry;
use crate::graph::GraphRetriever;
use crate::models::{Chunk, ChunkMetadata, IngestionOptions, Upload, TEXT_MEDIA_TYPE};
use crate::tags::{Tag, TagMode};
use crate::traits::{GraphStore, TextStore, VectorStore};
use crate::vector::VectorRetriever;
use crate::IngestError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, Instrument};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub source: String,
    pub chunks: Vec<Chunk>,
    pub tags: Vec<Tag>,
    pub status: String,
}

/// `report.pdf` → `report.txt`. Uploads sharing a base name overwrite each other.
pub fn text_file_name(original_name: &str) -> Result<String, IngestError> {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .ok_or_else(|| IngestError::MissingFileName(original_name.to_string()))?;
    Ok(format!("{stem}.txt"))
}

/// The write path: extract, persist, chunk and index, then tag.
/// A failing stage stops the run; earlier stages are not rolled back.
#[derive(Clone)]
pub struct IngestionPipeline<V, E, G, C, T> {
    extractors: ExtractorRegistry,
    text_store: T,
    vector: VectorRetriever<V, E>,
    graph: GraphRetriever<G, C>,
    options: IngestionOptions,
}

impl<V, E, G, C, T> IngestionPipeline<V, E, G, C, T>
where
    V: VectorStore,
    E: Embedder,
    G: GraphStore,
    C: CompletionProvider,
    T: TextStore,
{
    pub fn new(
        extractors: ExtractorRegistry,
        text_store: T,
        vector: VectorRetriever<V, E>,
        graph: GraphRetriever<G, C>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            extractors,
            text_store,
            vector,
            graph,
            options,
        }
    }

    pub async fn ingest(&self, upload: &Upload) -> Result<IngestionOutcome, IngestError> {
        let span = info_span!("ingest", file = %upload.original_name);
        self.run(upload).instrument(span).await
    }

    async fn run(&self, upload: &Upload) -> Result<IngestionOutcome, IngestError> {
        let name = text_file_name(&upload.original_name)?;

        let text = self.extractors.extract(upload).await?;
        info!(chars = text.chars().count(), "text extracted");

        let source = self.text_store.write(&name, &text).await?;
        info!(%source, "extracted text persisted");

        let metadata = ChunkMetadata {
            source: source.clone(),
            media_type: TEXT_MEDIA_TYPE.to_string(),
            length: text.chars().count(),
            processed_at: Utc::now(),
        };
        let chunks = build_chunks(&text, &metadata, &self.options)?;
        self.vector.index(&chunks).await?;
        self.graph.create_document(&metadata).await?;

        let sample = chunks
            .iter()
            .take(self.options.tag_sample_chunks)
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let tags = if sample.trim().is_empty() {
            Vec::new()
        } else {
            self.graph
                .tagger()
                .extract_tags(&sample, TagMode::Domain)
                .await?
                .into_tags()
        };
        self.graph.tag_document(&source, &tags).await?;

        let status = format!(
            "Ingested {}: {} chunk(s), {} tag(s)",
            upload.original_name,
            chunks.len(),
            tags.len()
        );
        info!(chunk_count = chunks.len(), tag_count = tags.len(), "ingestion finished");

        Ok(IngestionOutcome {
            source,
            chunks,
            tags,
            status,
        })
    }
}

/// Every regular file under `path`, sorted; `path` itself when it is a file.
pub fn discover_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    files
}

/// Media type from the file extension, for uploads that do not declare one.
pub fn guess_media_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        _ => TEXT_MEDIA_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Completion;
    use crate::embeddings::HashingEmbedder;
    use crate::models::Distance;
    use crate::stores::{MemoryGraphStore, MemoryTextStore, MemoryVectorStore};
    use crate::tags::TagExtractor;
    use crate::test_support::ScriptedCompletion;
    use std::fs;
    use tempfile::tempdir;

    type MemoryPipeline = IngestionPipeline<
        MemoryVectorStore,
        HashingEmbedder,
        MemoryGraphStore,
        ScriptedCompletion,
        MemoryTextStore,
    >;

    struct Harness {
        pipeline: MemoryPipeline,
        vectors: MemoryVectorStore,
        graph: MemoryGraphStore,
        texts: MemoryTextStore,
        completion: ScriptedCompletion,
    }

    fn harness(completion: ScriptedCompletion, options: IngestionOptions) -> Harness {
        let vectors = MemoryVectorStore::new("documents");
        let graph = MemoryGraphStore::new();
        let texts = MemoryTextStore::new();
        let pipeline = IngestionPipeline::new(
            ExtractorRegistry::default(),
            texts.clone(),
            VectorRetriever::new(vectors.clone(), HashingEmbedder::default(), Distance::Dot),
            GraphRetriever::new(graph.clone(), TagExtractor::new(completion.clone())),
            options,
        );
        Harness {
            pipeline,
            vectors,
            graph,
            texts,
            completion,
        }
    }

    #[test]
    fn text_names_drop_the_extension() -> Result<(), IngestError> {
        assert_eq!(text_file_name("report.pdf")?, "report.txt");
        assert_eq!(text_file_name("dir/voice.memo.mp3")?, "voice.memo.txt");
        assert_eq!(text_file_name("notes")?, "notes.txt");
        assert!(text_file_name("").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn plain_text_upload_is_chunked_indexed_and_tagged() -> Result<(), IngestError> {
        let h = harness(
            ScriptedCompletion::replying(r#"{"tags": ["renewable energy", "Solar Panels"]}"#),
            IngestionOptions::default(),
        );
        let upload = Upload::new(
            b"Solar panels convert sunlight into electricity.".to_vec(),
            "solar.txt",
            "text/plain",
        );

        let outcome = h.pipeline.ingest(&upload).await?;

        assert_eq!(outcome.source, "solar.txt");
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].metadata.media_type, TEXT_MEDIA_TYPE);
        assert_eq!(outcome.chunks[0].metadata.length, 47);
        assert_eq!(
            outcome.tags.iter().map(Tag::as_str).collect::<Vec<_>>(),
            vec!["Renewable Energy", "Solar Panels"]
        );
        assert!(outcome.status.contains("1 chunk(s)"));

        assert_eq!(h.vectors.len().await, 1);
        assert_eq!(h.graph.document_count().await, 1);
        assert_eq!(h.graph.tags_of("solar.txt").await.len(), 2);
        assert_eq!(
            h.texts.read("solar.txt").await?,
            "Solar panels convert sunlight into electricity."
        );
        Ok(())
    }

    #[tokio::test]
    async fn tag_sample_uses_only_the_leading_chunks() -> Result<(), IngestError> {
        let options = IngestionOptions {
            chunk_max_chars: 20,
            chunk_overlap_chars: 0,
            tag_sample_chunks: 2,
        };
        let h = harness(ScriptedCompletion::replying(r#"["Sequence"]"#), options);
        let text = "first part\n\nsecond part\n\nthird part\n\nfourth part";

        let outcome = h
            .pipeline
            .ingest(&Upload::new(text.as_bytes().to_vec(), "parts.md", "text/markdown"))
            .await?;

        assert_eq!(outcome.chunks.len(), 4);
        let prompts = h.completion.prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("first part second part"));
        assert!(!prompts[0].contains("third part"));
        Ok(())
    }

    #[tokio::test]
    async fn refused_tagging_still_completes_ingestion() -> Result<(), IngestError> {
        let h = harness(ScriptedCompletion::refusing("no"), IngestionOptions::default());
        let outcome = h
            .pipeline
            .ingest(&Upload::new(b"some text".to_vec(), "a.txt", "text/plain"))
            .await?;

        assert!(outcome.tags.is_empty());
        assert_eq!(h.vectors.len().await, 1);
        assert_eq!(h.graph.document_count().await, 1);
        assert_eq!(h.graph.edge_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn extraction_failure_stops_before_any_write() {
        let h = harness(ScriptedCompletion::replying("[]"), IngestionOptions::default());
        let upload = Upload::new(vec![1, 2, 3], "scan.png", "image/png");

        let result = h.pipeline.ingest(&upload).await;

        assert!(matches!(result, Err(IngestError::ExtractorUnavailable(_))));
        assert!(h.vectors.is_empty().await);
        assert!(h.texts.read("scan.txt").await.is_err());
    }

    #[tokio::test]
    async fn tagging_provider_outage_leaves_vectors_ahead_of_graph() {
        let h = harness(
            ScriptedCompletion::script(vec![Err("offline".to_string())]),
            IngestionOptions::default(),
        );
        let result = h
            .pipeline
            .ingest(&Upload::new(b"grid storage".to_vec(), "grid.txt", "text/plain"))
            .await;

        assert!(matches!(result, Err(IngestError::Completion(_))));
        assert_eq!(h.vectors.len().await, 1);
        assert_eq!(h.graph.edge_count().await, 0);
    }

    #[tokio::test]
    async fn empty_text_creates_a_document_without_tagging() -> Result<(), IngestError> {
        let h = harness(
            ScriptedCompletion::script(vec![Ok(Completion::Content("[\"Never\"]".into()))]),
            IngestionOptions::default(),
        );
        let outcome = h
            .pipeline
            .ingest(&Upload::new(Vec::new(), "empty.txt", "text/plain"))
            .await?;

        assert!(outcome.chunks.is_empty());
        assert!(h.completion.prompts().await.is_empty());
        assert_eq!(h.graph.document_count().await, 1);
        Ok(())
    }

    #[test]
    fn discovery_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("b.txt"), "b")?;
        fs::write(nested.join("a.pdf"), "%PDF")?;

        let files = discover_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.windows(2).all(|pair| pair[0] <= pair[1]));

        let single = discover_files(&dir.path().join("b.txt"));
        assert_eq!(single.len(), 1);
        Ok(())
    }

    #[test]
    fn media_types_follow_extensions() {
        assert_eq!(guess_media_type(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_media_type(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(guess_media_type(Path::new("a.pdf")), "application/pdf");
        assert_eq!(guess_media_type(Path::new("a.csv")), TEXT_MEDIA_TYPE);
    }
}
