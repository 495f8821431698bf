use crate::completion::{Completion, CompletionProvider, ResponseFormat};
use crate::CompletionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_WORDS: usize = 3;
/// Longer inputs are cut before they reach the completion provider.
pub const MAX_TAGGING_INPUT_CHARS: usize = 6_000;

const STOPWORDS: [&str; 40] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "i", "in", "is", "it",
    "me", "my", "of", "on", "or", "our", "so", "that", "the", "this", "to", "was", "we", "what",
    "when", "where", "which", "who", "why", "will", "with", "you", "your", "do", "does",
];

/// Words rendered upper-case regardless of how the label spelled them.
const ACRONYMS: [&str; 24] = [
    "ai", "api", "cpu", "dna", "esg", "gdp", "gpu", "http", "iot", "json", "llm", "ml", "nlp",
    "ocr", "pdf", "rag", "rna", "sql", "uk", "ui", "un", "usa", "ux", "xml",
];

/// A canonical topical label: 1-3 words, title-cased, no surrounding punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Canonicalizes a raw label, rejecting anything that is not a usable tag.
    pub fn parse(raw: &str) -> Option<Tag> {
        let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let words: Vec<&str> = trimmed.split_whitespace().collect();

        if words.is_empty() || words.len() > MAX_TAG_WORDS {
            return None;
        }

        if words
            .iter()
            .all(|word| STOPWORDS.contains(&word.to_lowercase().as_str()))
        {
            return None;
        }

        if !words
            .iter()
            .all(|word| word.chars().any(char::is_alphanumeric))
        {
            return None;
        }

        Some(Tag(
            words
                .iter()
                .map(|word| title_case(word))
                .collect::<Vec<_>>()
                .join(" "),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    if ACRONYMS.contains(&lower.as_str()) {
        return lower.to_uppercase();
    }

    word.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// Canonicalizes, deduplicates and caps a raw label list, keeping first-seen order.
pub fn normalize_tags<I, S>(raw: I) -> Vec<Tag>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|label| Tag::parse(label.as_ref()))
        .filter(|tag| seen.insert(tag.as_str().to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// Labels for a document, used as graph node names.
    Domain,
    /// Search labels for a user query, aimed at existing node names.
    Query,
}

/// Outcome of a tagging call. Refusals and unreadable replies are expected
/// outcomes that simply yield no tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExtraction {
    Tags(Vec<Tag>),
    Refused(String),
    Unparseable(String),
}

impl TagExtraction {
    pub fn into_tags(self) -> Vec<Tag> {
        match self {
            TagExtraction::Tags(tags) => tags,
            TagExtraction::Refused(_) | TagExtraction::Unparseable(_) => Vec::new(),
        }
    }

    pub fn tags(&self) -> &[Tag] {
        match self {
            TagExtraction::Tags(tags) => tags,
            TagExtraction::Refused(_) | TagExtraction::Unparseable(_) => &[],
        }
    }
}

#[derive(Clone)]
pub struct TagExtractor<C> {
    completion: C,
    max_input_chars: usize,
}

impl<C> TagExtractor<C>
where
    C: CompletionProvider,
{
    pub fn new(completion: C) -> Self {
        Self {
            completion,
            max_input_chars: MAX_TAGGING_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    /// Errors only when the provider itself fails; see [`TagExtraction`].
    pub async fn extract_tags(
        &self,
        text: &str,
        mode: TagMode,
    ) -> Result<TagExtraction, CompletionError> {
        let sample: String = text.chars().take(self.max_input_chars).collect();
        let prompt = build_tagging_prompt(&sample, mode);

        let outcome = match self
            .completion
            .complete(&prompt, ResponseFormat::TagList)
            .await?
        {
            Completion::Refusal(reason) => {
                warn!(?mode, %reason, "tagging refused");
                TagExtraction::Refused(reason)
            }
            Completion::Content(content) => match parse_tag_reply(&content) {
                Some(raw) => TagExtraction::Tags(normalize_tags(raw)),
                None => {
                    warn!(?mode, "tagging reply was not a tag list");
                    TagExtraction::Unparseable(content)
                }
            },
        };

        debug!(?mode, tags = ?outcome.tags(), "tags extracted");
        Ok(outcome)
    }
}

pub fn build_tagging_prompt(text: &str, mode: TagMode) -> String {
    match mode {
        TagMode::Domain => format!(
            "You curate a knowledge graph that links documents through shared topic nodes.\n\n\
             Read the text below and propose between 3 and {MAX_TAGS} short tags of 1 to {MAX_TAG_WORDS} words.\n\
             Mix broad tags naming the general field (for example \"Renewable Energy\", \"Healthcare\") \
             with specific tags naming precise concepts, entities or techniques \
             (for example \"Photovoltaic Cells\", \"Neural Decoding\").\n\
             Every tag must be unique, relevant and usable as a node label that connects related documents.\n\n\
             Text:\n{text}\n\n\
             Answer with a JSON object of the form {{\"tags\": [\"...\"]}}."
        ),
        TagMode::Query => format!(
            "You turn search questions into tags for looking up topic nodes in a knowledge graph.\n\n\
             Propose between 3 and {MAX_TAGS} search tags of 1 to {MAX_TAG_WORDS} words that cover both the \
             general domain and the precise subtopics the question implies.\n\
             Tags should match how topic nodes are usually named, use Title Case \
             (for example \"Climate Change\", \"Graph Neural Networks\"), \
             and leave out stopwords, punctuation and filler words.\n\n\
             Question:\n{text}\n\n\
             Answer with a JSON object of the form {{\"tags\": [\"...\"]}}."
        ),
    }
}

fn fenced_json() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").ok())
        .as_ref()
}

#[derive(Deserialize)]
struct TagReply {
    tags: Vec<String>,
}

/// Accepts `{"tags": [...]}` or a bare JSON list, optionally inside a code fence.
pub fn parse_tag_reply(content: &str) -> Option<Vec<String>> {
    let body = fenced_json()
        .and_then(|fence| fence.captures(content))
        .and_then(|captures| captures.get(1))
        .map_or(content, |inner| inner.as_str())
        .trim();

    if let Ok(reply) = serde_json::from_str::<TagReply>(body) {
        return Some(reply.tags);
    }

    serde_json::from_str::<Vec<String>>(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCompletion;

    #[test]
    fn tags_are_title_cased_and_trimmed() {
        assert_eq!(Tag::parse("  climate change. ").map(|t| t.0), Some("Climate Change".into()));
        assert_eq!(Tag::parse("\"graph neural NETWORKS\"").map(|t| t.0), Some("Graph Neural Networks".into()));
        assert_eq!(Tag::parse("NLP").map(|t| t.0), Some("NLP".into()));
        assert_eq!(Tag::parse("state-of-the-art").map(|t| t.0), Some("State-Of-The-Art".into()));
    }

    #[test]
    fn casing_of_the_input_does_not_change_the_tag() {
        assert_eq!(Tag::parse("SOLAR ENERGY"), Tag::parse("solar energy"));
        assert_eq!(Tag::parse("SOLAR ENERGY").map(|t| t.0), Some("Solar Energy".into()));
        assert_eq!(Tag::parse("nlp pipelines"), Tag::parse("NLP Pipelines"));
        assert_eq!(Tag::parse("Nlp").map(|t| t.0), Some("NLP".into()));
        assert_eq!(Tag::parse("WIND").map(|t| t.0), Some("Wind".into()));
    }

    #[test]
    fn unusable_labels_are_rejected() {
        assert!(Tag::parse("").is_none());
        assert!(Tag::parse("!!!").is_none());
        assert!(Tag::parse("the").is_none());
        assert!(Tag::parse("of the").is_none());
        assert!(Tag::parse("one two three four").is_none());
    }

    #[test]
    fn normalization_dedupes_and_caps() {
        let raw = vec![
            "Solar", "solar", "Energy", "Grid", "Wind", "Battery", "Storage", "Inverter", "Panel",
            "Sunlight", "Electricity", "Turbine",
        ];
        let tags = normalize_tags(raw);
        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(tags[0].as_str(), "Solar");
        assert_eq!(tags[1].as_str(), "Energy");
    }

    #[test]
    fn replies_parse_in_object_list_and_fenced_forms() {
        assert_eq!(
            parse_tag_reply(r#"{"tags": ["A", "B"]}"#),
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(parse_tag_reply(r#"["A"]"#), Some(vec!["A".to_string()]));
        assert_eq!(
            parse_tag_reply("```json\n[\"Solar Power\"]\n```"),
            Some(vec!["Solar Power".to_string()])
        );
        assert_eq!(parse_tag_reply("I think the tags are solar and wind"), None);
    }

    #[tokio::test]
    async fn refusal_and_garbage_yield_no_tags() -> Result<(), CompletionError> {
        let refusing = TagExtractor::new(ScriptedCompletion::refusing("no"));
        let outcome = refusing.extract_tags("text", TagMode::Domain).await?;
        assert_eq!(outcome, TagExtraction::Refused("no".to_string()));
        assert!(outcome.into_tags().is_empty());

        let garbled = TagExtractor::new(ScriptedCompletion::replying("not json"));
        let outcome = garbled.extract_tags("text", TagMode::Query).await?;
        assert!(matches!(outcome, TagExtraction::Unparseable(_)));
        assert!(outcome.tags().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn provider_failures_are_errors() {
        let failing = TagExtractor::new(ScriptedCompletion::failing("down"));
        let result = failing.extract_tags("text", TagMode::Domain).await;
        assert!(matches!(result, Err(CompletionError::Provider(_))));
    }

    #[tokio::test]
    async fn long_input_is_truncated_before_prompting() -> Result<(), CompletionError> {
        let completion = ScriptedCompletion::replying(r#"{"tags": ["Solar Energy"]}"#);
        let extractor = TagExtractor::new(completion.clone()).with_max_input_chars(10);

        let outcome = extractor
            .extract_tags(&"x".repeat(50), TagMode::Domain)
            .await?;

        assert_eq!(outcome.tags()[0].as_str(), "Solar Energy");
        let prompts = completion.prompts().await;
        assert!(prompts[0].contains(&"x".repeat(10)));
        assert!(!prompts[0].contains(&"x".repeat(11)));
        Ok(())
    }

    #[test]
    fn prompt_mode_selects_the_template() {
        assert!(build_tagging_prompt("q", TagMode::Domain).contains("Text:\nq"));
        assert!(build_tagging_prompt("q", TagMode::Query).contains("Question:\nq"));
    }
}
