use crate::error::IngestError;
use crate::models::{Chunk, ChunkMetadata, IngestionOptions};
use uuid::Uuid;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(self) -> Result<Self, IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(self)
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text into pieces of at most `max_chars` characters, preferring
/// paragraph, then line, then word boundaries. Consecutive pieces share up
/// to `overlap_chars` characters of trailing context.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_with(text, &SEPARATORS, config)
        .into_iter()
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn split_with(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    if char_len(text) <= config.max_chars {
        return vec![text.to_string()];
    }

    let Some((separator, finer)) = separators.split_first() else {
        return hard_split(text, config);
    };

    if !text.contains(separator) {
        return split_with(text, finer, config);
    }

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in text.split(separator).filter(|piece| !piece.trim().is_empty()) {
        if char_len(piece) > config.max_chars {
            chunks.extend(merge_pieces(&pending, separator, config));
            pending.clear();
            chunks.extend(split_with(piece, finer, config));
        } else {
            pending.push(piece);
        }
    }
    chunks.extend(merge_pieces(&pending, separator, config));

    chunks
}

fn joined_len(window: &[&str], separator_len: usize) -> usize {
    let content: usize = window.iter().map(|piece| char_len(piece)).sum();
    content + separator_len * window.len().saturating_sub(1)
}

fn merge_pieces(pieces: &[&str], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();

    for piece in pieces {
        let piece_len = char_len(piece);
        let grown = joined_len(&window, separator_len) + separator_len + piece_len;

        if !window.is_empty() && grown > config.max_chars {
            chunks.push(window.join(separator));

            while !window.is_empty()
                && (joined_len(&window, separator_len) > config.overlap_chars
                    || joined_len(&window, separator_len) + separator_len + piece_len
                        > config.max_chars)
            {
                window.remove(0);
            }
        }

        window.push(piece);
    }

    if !window.is_empty() {
        chunks.push(window.join(separator));
    }

    chunks
}

fn hard_split(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    pieces
}

/// Splits the extracted text and stamps every piece with the shared metadata.
pub fn build_chunks(
    text: &str,
    metadata: &ChunkMetadata,
    options: &IngestionOptions,
) -> Result<Vec<Chunk>, IngestError> {
    let config = ChunkingConfig::from(options).validate()?;

    Ok(split_text(text, config)
        .into_iter()
        .map(|content| Chunk {
            id: Uuid::new_v4(),
            content,
            metadata: metadata.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let pieces = split_text("Solar panels convert sunlight into electricity.", config(1000, 50));
        assert_eq!(pieces, vec!["Solar panels convert sunlight into electricity."]);
    }

    #[test]
    fn paragraphs_are_packed_up_to_the_limit() {
        let text = "alpha beta\n\ngamma delta\n\nepsilon zeta";
        let pieces = split_text(text, config(24, 0));
        assert_eq!(pieces, vec!["alpha beta\n\ngamma delta", "epsilon zeta"]);
    }

    #[test]
    fn every_piece_respects_the_limit_and_overlaps() {
        let text = (0..200).map(|n| format!("word{n}")).collect::<Vec<_>>().join(" ");
        let pieces = split_text(&text, config(60, 15));

        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 60));
        for pair in pieces.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap_or_default();
            assert!(pair[1].starts_with(last_word) || pair[1].contains(last_word));
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_character_windows() {
        let text = "x".repeat(25);
        let pieces = split_text(&text, config(10, 2));
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].len(), 10);
        assert_eq!(pieces[2].len(), 9);
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        assert!(config(10, 10).validate().is_err());
        assert!(config(0, 0).validate().is_err());
        assert!(config(10, 9).validate().is_ok());
    }

    #[test]
    fn chunks_share_metadata_and_have_distinct_ids() -> Result<(), IngestError> {
        let metadata = ChunkMetadata {
            source: "uploaded_files/notes.txt".to_string(),
            media_type: crate::TEXT_MEDIA_TYPE.to_string(),
            length: 5_000,
            processed_at: Utc::now(),
        };
        let options = IngestionOptions {
            chunk_max_chars: 100,
            chunk_overlap_chars: 10,
            ..IngestionOptions::default()
        };
        let text = "lorem ipsum ".repeat(40);

        let chunks = build_chunks(&text, &metadata, &options)?;
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.metadata == metadata));
        assert_ne!(chunks[0].id, chunks[1].id);
        Ok(())
    }
}
