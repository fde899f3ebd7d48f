//! Text chunking and vector validation for file embeddings.

use crate::error::CoreError;

/// Dimension of every stored embedding vector.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Split `text` into chunks of at most `max_chars` characters, each
/// starting `max_chars - overlap` characters after the previous one.
///
/// Whitespace-only chunks are dropped. Chunk boundaries never split a
/// multi-byte character.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<String>, CoreError> {
    if max_chars == 0 {
        return Err(CoreError::Validation("Chunk size must be positive".into()));
    }
    if overlap >= max_chars {
        return Err(CoreError::Validation(format!(
            "Chunk overlap ({overlap}) must be smaller than chunk size ({max_chars})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let step = max_chars - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Check that a vector has the stored dimension and only finite values.
pub fn validate_vector(vector: &[f32]) -> Result<(), CoreError> {
    if vector.len() != EMBEDDING_DIMENSION {
        return Err(CoreError::Validation(format!(
            "Embedding vector must have {EMBEDDING_DIMENSION} dimensions, got {}",
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::Validation(
            "Embedding vector contains non-finite values".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello", 100, 10).unwrap(), vec!["hello"]);
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
        assert!(chunk_text("   ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_chars() {
        let chunks = chunk_text("ääääää", 4, 0).unwrap();
        assert_eq!(chunks, vec!["ääää", "ää"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(chunk_text("abc", 4, 4).is_err());
        assert!(chunk_text("abc", 0, 0).is_err());
    }

    #[test]
    fn vector_dimension_is_enforced() {
        assert!(validate_vector(&vec![0.0; EMBEDDING_DIMENSION]).is_ok());
        assert!(validate_vector(&vec![0.0; 3]).is_err());
        let mut bad = vec![0.0; EMBEDDING_DIMENSION];
        bad[0] = f32::NAN;
        assert!(validate_vector(&bad).is_err());
    }
}
