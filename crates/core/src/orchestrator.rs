use crate::completion::{Completion, CompletionProvider, ResponseFormat};
use crate::embeddings::Embedder;
use crate::graph::GraphRetriever;
use crate::models::{EvidenceBlock, EvidenceBundle, QueryOptions, RetrievalResult};
use crate::traits::{GraphStore, TextStore, VectorStore};
use crate::vector::VectorRetriever;
use crate::SearchError;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub evidence: EvidenceBundle,
}

/// The read path: fan the query out to both backends, load bounded
/// evidence for each, and ask the completion provider for one answer.
#[derive(Clone)]
pub struct SearchCoordinator<V, E, G, C, T> {
    vector: VectorRetriever<V, E>,
    graph: GraphRetriever<G, C>,
    text_store: T,
    completion: C,
    options: QueryOptions,
}

impl<V, E, G, C, T> SearchCoordinator<V, E, G, C, T>
where
    V: VectorStore,
    E: Embedder,
    G: GraphStore,
    C: CompletionProvider,
    T: TextStore,
{
    pub fn new(
        vector: VectorRetriever<V, E>,
        graph: GraphRetriever<G, C>,
        text_store: T,
        completion: C,
        options: QueryOptions,
    ) -> Self {
        Self {
            vector,
            graph,
            text_store,
            completion,
            options,
        }
    }

    pub async fn answer(&self, query: &str) -> Result<String, SearchError> {
        Ok(self.answer_with_evidence(query).await?.text)
    }

    pub async fn answer_with_evidence(&self, query: &str) -> Result<Answer, SearchError> {
        let evidence = self.gather_evidence(query).await?;
        let text = self.synthesize(query, &evidence).await?;
        Ok(Answer { text, evidence })
    }

    pub async fn gather_evidence(&self, query: &str) -> Result<EvidenceBundle, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let (vector_hits, graph_hits) = tokio::try_join!(
            self.vector.search(query, self.options.vector_limit),
            self.graph.semantic_search(query)
        )?;
        info!(
            vector_hits = vector_hits.len(),
            graph_hits = graph_hits.len(),
            "retrieval finished"
        );

        let max_chars = self.options.evidence_max_chars;
        let (vector, graph) = tokio::join!(
            load_evidence(&self.text_store, &vector_hits, max_chars),
            load_evidence(&self.text_store, &graph_hits, max_chars)
        );

        Ok(EvidenceBundle { vector, graph })
    }

    pub async fn synthesize(
        &self,
        query: &str,
        evidence: &EvidenceBundle,
    ) -> Result<String, SearchError> {
        let prompt = build_synthesis_prompt(query, evidence);
        match self.completion.complete(&prompt, ResponseFormat::Text).await? {
            Completion::Content(text) => Ok(text),
            Completion::Refusal(reason) => Err(SearchError::Synthesis(format!(
                "the model declined to answer: {reason}"
            ))),
        }
    }
}

/// Keeps text results with a source, first occurrence per source in backend
/// order, and reads each source truncated to `max_chars` characters. A read
/// failure becomes an inline diagnostic for that source only.
pub async fn load_evidence<T: TextStore>(
    store: &T,
    results: &[RetrievalResult],
    max_chars: usize,
) -> Vec<EvidenceBlock> {
    let mut seen_sources = HashSet::new();
    let mut blocks = Vec::new();

    for result in results.iter().filter(|result| result.is_text()) {
        let Some(source) = result.source.as_deref() else {
            continue;
        };
        if !seen_sources.insert(source) {
            continue;
        }

        let block = match store.read(source).await {
            Ok(text) => EvidenceBlock {
                source: source.to_string(),
                text: text.chars().take(max_chars).collect(),
                loaded: true,
            },
            Err(error) => {
                warn!(%source, %error, "evidence unavailable");
                EvidenceBlock {
                    source: source.to_string(),
                    text: format!("[Unable to load {source}: {error}]"),
                    loaded: false,
                }
            }
        };
        blocks.push(block);
    }

    debug!(
        candidates = results.len(),
        loaded = blocks.len(),
        "evidence assembled"
    );
    blocks
}

pub fn build_synthesis_prompt(query: &str, evidence: &EvidenceBundle) -> String {
    format!(
        "You answer questions for a retrieval system that searches two indexes:\n\
         1. a vector index that returns passages semantically close to the question;\n\
         2. a knowledge graph that returns documents sharing topic tags with the question.\n\n\
         Instructions:\n\
         - Read both result sets and combine what is relevant, without repeating yourself.\n\
         - When the two sets disagree, trust the knowledge graph results.\n\
         - If neither set supports an answer, say so plainly.\n\
         - Reply with one short, factual paragraph.\n\n\
         Question:\n{query}\n\n\
         Vector index results:\n{vector}\n\n\
         Knowledge graph results:\n{graph}\n",
        vector = evidence.vector_text(),
        graph = evidence.graph_text(),
    )
}
