//! Character-window text splitting for knowledge-base ingestion.

/// A slice of a document ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Character offset of the window start in the source text.
    pub start_offset: usize,
    pub chunk_index: usize,
}

/// Split `text` into windows of at most `chunk_size` characters.
///
/// Neighbouring windows share `chunk_overlap` characters. A window that does
/// not reach the end of the text is cut back to the last whitespace found in
/// its final fifth, when there is one.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    let mut chunks = Vec::new();

    if text.trim().is_empty() {
        return chunks;
    }

    let chunk_size = chunk_size.max(1);
    let overlap = chunk_overlap.min(chunk_size - 1);
    let mut start = 0;

    while start < total_chars {
        let mut end = (start + chunk_size).min(total_chars);
        if end < total_chars {
            end = whitespace_boundary(&chars, start, end);
        }

        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                text: trimmed.to_string(),
                start_offset: start,
                chunk_index: chunks.len(),
            });
        }

        if end >= total_chars {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

fn whitespace_boundary(chars: &[char], start: usize, end: usize) -> usize {
    if chars[end].is_whitespace() {
        return end;
    }
    let search_start = start + ((end - start) * 80) / 100;
    (search_start..end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
        .filter(|&cut| cut > start)
        .unwrap_or(end)
}
