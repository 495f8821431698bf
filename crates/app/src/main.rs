use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use hybrid_rag_core::{
    discover_files, guess_media_type, CompletionProvider, Distance, ExtractorRegistry,
    FsTextStore, GraphRetriever, HashingEmbedder, IngestionOptions, IngestionPipeline,
    Neo4jStore, OpenAiCompletion, QdrantStore, QueryOptions, SearchCoordinator, TagExtractor,
    TagMode, Upload, VectorRetriever,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hybrid-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "documents")]
    qdrant_collection: String,

    /// Similarity metric used when the collection is created
    #[arg(long, env = "QDRANT_DISTANCE", value_enum, default_value_t = DistanceArg::Dot)]
    distance: DistanceArg,

    /// Neo4j HTTP URL
    #[arg(long, env = "NEO4J_URL", default_value = "http://localhost:7474")]
    neo4j_url: String,

    /// Neo4j database name
    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    neo4j_db: String,

    /// Neo4j username
    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password123")]
    neo4j_password: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    llm_url: String,

    /// Completion model
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// API key for the completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Sampling temperature for tagging and answers
    #[arg(long, default_value = "0.3")]
    llm_temperature: f32,

    /// Embedding dimensionality; must match an existing collection
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "256")]
    embedding_dimensions: usize,

    /// Directory that receives the extracted text of every upload
    #[arg(long, env = "DOCUMENTS_DIR", default_value = "./uploaded_files")]
    documents_dir: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum DistanceArg {
    Cosine,
    Dot,
    Euclid,
}

impl From<DistanceArg> for Distance {
    fn from(value: DistanceArg) -> Self {
        match value {
            DistanceArg::Cosine => Distance::Cosine,
            DistanceArg::Dot => Distance::Dot,
            DistanceArg::Euclid => Distance::Euclid,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Domain,
    Query,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a file, or every file under a folder.
    Ingest {
        /// File or folder to ingest.
        #[arg(long)]
        path: PathBuf,
        /// Media type to declare instead of guessing from the extension.
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Answer a question from both indexes.
    Ask {
        /// The question.
        #[arg(long)]
        query: String,
        /// Print the evidence passed to the model.
        #[arg(long, default_value_t = false)]
        show_evidence: bool,
    },
    /// Print the tags extracted from a piece of text.
    Tags {
        #[arg(long)]
        text: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Domain)]
        mode: ModeArg,
    },
    /// List documents linked to tags containing a fragment.
    SearchTag {
        #[arg(long)]
        tag: String,
    },
}

type Completer = Arc<dyn CompletionProvider>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let completion: Completer = Arc::new(
        OpenAiCompletion::new(
            &cli.llm_url,
            cli.llm_api_key.clone(),
            &cli.llm_model,
            cli.llm_temperature,
        )
        .context("invalid completion endpoint")?,
    );
    let vector = VectorRetriever::new(
        QdrantStore::new(&cli.qdrant_url, &cli.qdrant_collection),
        HashingEmbedder::new(cli.embedding_dimensions),
        cli.distance.into(),
    );
    let graph = GraphRetriever::new(
        Neo4jStore::new(
            &cli.neo4j_url,
            &cli.neo4j_db,
            &cli.neo4j_user,
            &cli.neo4j_password,
        ),
        TagExtractor::new(completion.clone()),
    );
    let text_store = FsTextStore::new(&cli.documents_dir);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "hybrid-rag boot"
    );

    match cli.command {
        Command::Ingest { path, media_type } => {
            let pipeline = IngestionPipeline::new(
                ExtractorRegistry::from_env(),
                text_store,
                vector,
                graph,
                IngestionOptions::default(),
            );
            ingest_path(&pipeline, &path, media_type.as_deref()).await?;
        }
        Command::Ask {
            query,
            show_evidence,
        } => {
            let coordinator = SearchCoordinator::new(
                vector,
                graph,
                text_store,
                completion,
                QueryOptions::default(),
            );
            let answer = coordinator
                .answer_with_evidence(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if show_evidence {
                for block in &answer.evidence.vector {
                    println!("[vector] {} ({} chars)", block.source, block.text.chars().count());
                }
                for block in &answer.evidence.graph {
                    println!("[graph] {} ({} chars)", block.source, block.text.chars().count());
                }
                println!();
            }
            println!("{}", answer.text);
        }
        Command::Tags { text, mode } => {
            let mode = match mode {
                ModeArg::Domain => TagMode::Domain,
                ModeArg::Query => TagMode::Query,
            };
            let outcome = graph
                .tagger()
                .extract_tags(&text, mode)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            if outcome.tags().is_empty() {
                println!("no tags ({outcome:?})");
            }
            for tag in outcome.tags() {
                println!("{tag}");
            }
        }
        Command::SearchTag { tag } => {
            let records = graph
                .search_by_tag(&tag)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            for record in records {
                println!(
                    "{} type={} tags={}",
                    record.source.as_deref().unwrap_or("<unknown>"),
                    record.media_type.as_deref().unwrap_or("<unknown>"),
                    record.tags.join(", ")
                );
            }
        }
    }

    Ok(())
}

async fn ingest_path(
    pipeline: &IngestionPipeline<QdrantStore, HashingEmbedder, Neo4jStore, Completer, FsTextStore>,
    path: &Path,
    media_type: Option<&str>,
) -> anyhow::Result<()> {
    let files = discover_files(path);
    if files.is_empty() {
        anyhow::bail!("no files found at {}", path.display());
    }

    let mut failures = 0usize;
    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let original_name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let declared = media_type.unwrap_or_else(|| guess_media_type(file));

        match pipeline
            .ingest(&Upload::new(bytes, original_name, declared))
            .await
        {
            Ok(outcome) => println!("{}", outcome.status),
            Err(error) => {
                failures += 1;
                warn!(path = %file.display(), %error, "ingestion failed");
                println!("failed {}: {error}", file.display());
            }
        }
    }

    if failures == files.len() {
        anyhow::bail!("all {} file(s) failed to ingest", failures);
    }
    Ok(())
}
