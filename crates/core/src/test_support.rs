use crate::completion::{Completion, CompletionProvider, ResponseFormat};
use crate::models::{DocumentNode, GraphRecord};
use crate::traits::GraphStore;
use crate::{CompletionError, SearchError, Tag};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type Reply = Result<Completion, String>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    last: Option<Reply>,
    prompts: Vec<String>,
}

/// Completion provider that plays back canned replies in order and repeats
/// the final one once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedCompletion {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCompletion {
    pub fn script(replies: Vec<Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                ..Script::default()
            })),
        }
    }

    pub fn replying(content: &str) -> Self {
        Self::script(vec![Ok(Completion::Content(content.to_string()))])
    }

    pub fn refusing(reason: &str) -> Self {
        Self::script(vec![Ok(Completion::Refusal(reason.to_string()))])
    }

    pub fn failing(message: &str) -> Self {
        Self::script(vec![Err(message.to_string())])
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.script.lock().await.prompts.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _format: ResponseFormat,
    ) -> Result<Completion, CompletionError> {
        let mut script = self.script.lock().await;
        script.prompts.push(prompt.to_string());

        let reply = match script.replies.pop_front() {
            Some(reply) => {
                script.last = Some(reply.clone());
                reply
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| Err("script is empty".to_string())),
        };

        reply.map_err(CompletionError::Provider)
    }
}

/// Graph store with fixed per-tag answers that records every lookup.
#[derive(Clone, Default)]
pub struct CountingGraphStore {
    answers: Arc<Vec<(String, Vec<GraphRecord>)>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl CountingGraphStore {
    pub fn with_lookup(answers: Vec<(&str, Vec<GraphRecord>)>) -> Self {
        Self {
            answers: Arc::new(
                answers
                    .into_iter()
                    .map(|(tag, records)| (tag.to_string(), records))
                    .collect(),
            ),
            lookups: Arc::default(),
        }
    }

    pub async fn lookups(&self) -> Vec<String> {
        self.lookups.lock().await.clone()
    }
}

#[async_trait]
impl GraphStore for CountingGraphStore {
    async fn upsert_document(&self, _document: &DocumentNode) -> Result<(), SearchError> {
        Ok(())
    }

    async fn tag_document(&self, _source: &str, _tags: &[Tag]) -> Result<(), SearchError> {
        Ok(())
    }

    async fn documents_by_tag(&self, fragment: &str) -> Result<Vec<GraphRecord>, SearchError> {
        self.lookups.lock().await.push(fragment.to_string());
        Ok(self
            .answers
            .iter()
            .find(|(tag, _)| tag == fragment)
            .map(|(_, records)| records.clone())
            .unwrap_or_default())
    }
}
