use crate::error::IngestError;
use crate::models::{MediaFamily, Upload};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, upload: &Upload) -> Result<String, IngestError>;
}

#[derive(Debug, Clone, Serialize)]
struct RemoteExtractionRequest<'a> {
    content_base64: String,
    file_name: &'a str,
    media_type: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteExtractionResponse {
    #[serde(default)]
    pages: Option<Vec<RemotePage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemotePage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl RemoteEndpointConfig {
    /// Reads `<prefix>_ENDPOINT` and `<prefix>_API_KEY`; blank values count as unset.
    pub fn from_env(prefix: &str) -> Option<Self> {
        let endpoint = non_blank_env(&format!("{prefix}_ENDPOINT"))?;
        let api_key = non_blank_env(&format!("{prefix}_API_KEY"));
        Some(Self { endpoint, api_key })
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Sends the upload to an HTTP service (OCR or speech-to-text) and reads
/// back its transcript.
#[derive(Clone)]
pub struct RemoteExtractor {
    config: RemoteEndpointConfig,
    family: MediaFamily,
    client: Client,
}

impl RemoteExtractor {
    pub fn new(config: RemoteEndpointConfig, family: MediaFamily) -> Self {
        Self {
            config,
            family,
            client: Client::new(),
        }
    }

    fn failure(&self, details: String) -> IngestError {
        match self.family {
            MediaFamily::Audio => IngestError::TranscriptionFailed(details),
            _ => IngestError::OcrFailed(details),
        }
    }
}

#[async_trait]
impl TextExtractor for RemoteExtractor {
    async fn extract(&self, upload: &Upload) -> Result<String, IngestError> {
        let payload = RemoteExtractionRequest {
            content_base64: STANDARD.encode(&upload.bytes),
            file_name: &upload.original_name,
            media_type: &upload.declared_media_type,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(self.failure(format!(
                "request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let body: RemoteExtractionResponse = response.json().await?;
        response_text(&body).ok_or_else(|| {
            self.failure(format!(
                "response has no readable text for {}",
                upload.original_name
            ))
        })
    }
}

fn response_text(response: &RemoteExtractionResponse) -> Option<String> {
    if let Some(pages) = &response.pages {
        let joined = pages
            .iter()
            .filter_map(|page| page.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    response
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn extract_bytes(&self, bytes: &[u8], name: &str) -> Result<String, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for page_no in document.get_pages().keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {name}"
            )));
        }

        Ok(pages.join("\n\n"))
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, upload: &Upload) -> Result<String, IngestError> {
        let bytes = upload.bytes.clone();
        let name = upload.original_name.clone();
        let extractor = *self;
        tokio::task::spawn_blocking(move || extractor.extract_bytes(&bytes, &name))
            .await
            .map_err(|error| IngestError::PdfParse(error.to_string()))?
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, upload: &Upload) -> Result<String, IngestError> {
        Ok(String::from_utf8(upload.bytes.clone())?)
    }
}

/// The closed set of ways an upload can be turned into text.
#[derive(Clone)]
pub enum ExtractionStrategy {
    Ocr(RemoteExtractor),
    Transcription(RemoteExtractor),
    Pdf(PdfTextExtractor),
    PlainText(PlainTextExtractor),
}

impl ExtractionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractionStrategy::Ocr(_) => "ocr",
            ExtractionStrategy::Transcription(_) => "transcription",
            ExtractionStrategy::Pdf(_) => "pdf",
            ExtractionStrategy::PlainText(_) => "plain-text",
        }
    }
}

#[async_trait]
impl TextExtractor for ExtractionStrategy {
    async fn extract(&self, upload: &Upload) -> Result<String, IngestError> {
        match self {
            ExtractionStrategy::Ocr(extractor) => extractor.extract(upload).await,
            ExtractionStrategy::Transcription(extractor) => extractor.extract(upload).await,
            ExtractionStrategy::Pdf(extractor) => extractor.extract(upload).await,
            ExtractionStrategy::PlainText(extractor) => extractor.extract(upload).await,
        }
    }
}

/// Picks the strategy for an upload's declared media type.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    ocr: Option<RemoteExtractor>,
    transcription: Option<RemoteExtractor>,
}

impl ExtractorRegistry {
    pub fn new(
        ocr: Option<RemoteEndpointConfig>,
        transcription: Option<RemoteEndpointConfig>,
    ) -> Self {
        Self {
            ocr: ocr.map(|config| RemoteExtractor::new(config, MediaFamily::Image)),
            transcription: transcription
                .map(|config| RemoteExtractor::new(config, MediaFamily::Audio)),
        }
    }

    /// Reads `OCR_*` and `TRANSCRIPTION_*` endpoint settings.
    pub fn from_env() -> Self {
        Self::new(
            RemoteEndpointConfig::from_env("OCR"),
            RemoteEndpointConfig::from_env("TRANSCRIPTION"),
        )
    }

    pub fn strategy_for(&self, family: MediaFamily) -> Result<ExtractionStrategy, IngestError> {
        let unavailable = || IngestError::ExtractorUnavailable(family.as_str().to_string());
        match family {
            MediaFamily::Image => self
                .ocr
                .clone()
                .map(ExtractionStrategy::Ocr)
                .ok_or_else(unavailable),
            MediaFamily::Audio => self
                .transcription
                .clone()
                .map(ExtractionStrategy::Transcription)
                .ok_or_else(unavailable),
            MediaFamily::Pdf => Ok(ExtractionStrategy::Pdf(PdfTextExtractor)),
            MediaFamily::Text => Ok(ExtractionStrategy::PlainText(PlainTextExtractor)),
        }
    }

    pub async fn extract(&self, upload: &Upload) -> Result<String, IngestError> {
        let family = MediaFamily::from_declared(&upload.declared_media_type);
        let strategy = self.strategy_for(family)?;
        debug!(file = %upload.original_name, strategy = strategy.name(), "extracting text");
        strategy.extract(upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_texts_are_joined_and_blank_pages_dropped() {
        let response = RemoteExtractionResponse {
            pages: Some(vec![
                RemotePage { text: Some("  ".to_string()) },
                RemotePage { text: Some("Page 2".to_string()) },
                RemotePage { text: Some("Page 3\n".to_string()) },
            ]),
            text: None,
        };
        assert_eq!(response_text(&response).as_deref(), Some("Page 2\n\nPage 3"));
    }

    #[test]
    fn plain_text_field_is_the_fallback() {
        let response = RemoteExtractionResponse {
            pages: Some(Vec::new()),
            text: Some(" transcript ".to_string()),
        };
        assert_eq!(response_text(&response).as_deref(), Some("transcript"));

        let empty = RemoteExtractionResponse { pages: None, text: Some(String::new()) };
        assert!(response_text(&empty).is_none());
    }

    #[tokio::test]
    async fn text_uploads_decode_as_utf8() -> Result<(), IngestError> {
        let registry = ExtractorRegistry::default();
        let upload = Upload::new(b"hello".to_vec(), "a.txt", "text/plain");
        assert_eq!(registry.extract(&upload).await?, "hello");

        let invalid = Upload::new(vec![0xff, 0xfe], "b.txt", "text/plain");
        assert!(matches!(
            registry.extract(&invalid).await,
            Err(IngestError::InvalidText(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_pdf_surfaces_a_parse_error() {
        let registry = ExtractorRegistry::default();
        let upload = Upload::new(b"%PDF-1.4\n%broken".to_vec(), "a.pdf", "application/pdf");
        assert!(matches!(
            registry.extract(&upload).await,
            Err(IngestError::PdfParse(_))
        ));
    }

    #[test]
    fn unconfigured_remote_families_are_unavailable() {
        let registry = ExtractorRegistry::default();
        assert!(matches!(
            registry.strategy_for(MediaFamily::Image),
            Err(IngestError::ExtractorUnavailable(family)) if family == "image"
        ));
        assert!(matches!(
            registry.strategy_for(MediaFamily::Audio),
            Err(IngestError::ExtractorUnavailable(_))
        ));

        let configured = ExtractorRegistry::new(
            Some(RemoteEndpointConfig {
                endpoint: "http://localhost:9/ocr".to_string(),
                api_key: None,
            }),
            None,
        );
        assert!(matches!(
            configured.strategy_for(MediaFamily::Image),
            Ok(ExtractionStrategy::Ocr(_))
        ));
    }
}
