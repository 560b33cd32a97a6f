//! Splits corpus documents into overlapping windows for retrieval.

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Character-based overlapping chunks. Each chunk holds up to `chunk_size`
/// characters and shares `overlap` characters with its predecessor.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> anyhow::Result<Vec<String>> {
    anyhow::ensure!(chunk_size >= 1, "chunk_size must be >= 1 (got {chunk_size})");
    anyhow::ensure!(
        overlap < chunk_size,
        "overlap {overlap} must be smaller than chunk_size {chunk_size}"
    );

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(out)
}
