use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("no extractor configured for {0} uploads")]
    ExtractorUnavailable(String),

    #[error("upload is not valid utf-8 text: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    #[error("upload has no usable file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "collection `{collection}` stores {actual}-dimensional vectors but the embedder produces {expected}"
    )]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("search request failed: {0}")]
    Request(String),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion response was not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid completion endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("completion provider error: {0}")]
    Provider(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
