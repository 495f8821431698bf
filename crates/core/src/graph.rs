use crate::completion::CompletionProvider;
use crate::models::{ChunkMetadata, DocumentNode, GraphRecord, Origin, RetrievalResult};
use crate::tags::{Tag, TagExtractor, TagMode};
use crate::traits::GraphStore;
use crate::SearchError;
use std::collections::HashSet;
use tracing::{debug, info};

/// Tag-based retrieval over the document/tag graph.
#[derive(Clone)]
pub struct GraphRetriever<G, C> {
    store: G,
    tagger: TagExtractor<C>,
}

impl<G, C> GraphRetriever<G, C>
where
    G: GraphStore,
    C: CompletionProvider,
{
    pub fn new(store: G, tagger: TagExtractor<C>) -> Self {
        Self { store, tagger }
    }

    pub fn tagger(&self) -> &TagExtractor<C> {
        &self.tagger
    }

    pub async fn create_document(&self, metadata: &ChunkMetadata) -> Result<(), SearchError> {
        self.store.upsert_document(&DocumentNode::from(metadata)).await
    }

    pub async fn tag_document(&self, source: &str, tags: &[Tag]) -> Result<(), SearchError> {
        self.store.tag_document(source, tags).await?;
        info!(%source, tag_count = tags.len(), "document tagged");
        Ok(())
    }

    pub async fn search_by_tag(&self, tag: &str) -> Result<Vec<GraphRecord>, SearchError> {
        self.store.documents_by_tag(tag).await
    }

    /// Tags the query, looks each tag up in order and keeps the first hit per
    /// source. A source matched again by a later tag is dropped, so
    /// `matched_tag` always names the earliest tag that found it.
    pub async fn semantic_search(&self, query: &str) -> Result<Vec<RetrievalResult>, SearchError> {
        let tags = self
            .tagger
            .extract_tags(query, TagMode::Query)
            .await?
            .into_tags();

        if tags.is_empty() {
            debug!("query produced no tags; skipping graph lookup");
            return Ok(Vec::new());
        }

        let mut seen_sources = HashSet::new();
        let mut results = Vec::new();

        for tag in tags {
            for record in self.search_by_tag(tag.as_str()).await? {
                if !seen_sources.insert(record.source.clone()) {
                    continue;
                }

                results.push(RetrievalResult {
                    source: record.source,
                    media_type: record.media_type,
                    origin: Origin::Graph {
                        matched_tag: tag.clone(),
                        tags: record.tags,
                    },
                });
            }
        }

        debug!(hits = results.len(), "graph search finished");
        Ok(results)
    }
}
