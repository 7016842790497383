//! Chunking policy (§4.R.1 / SUPPLEMENT 4.R.1).
//!
//! No pack example chunks text by word count with sentence-aware overlap,
//! so this is built fresh in plain functions over owned `String`/`Vec`,
//! matching the teacher's preference for direct data manipulation over
//! pulling in a text-segmentation crate.

use crate::collab::pdf::PageText;

#[derive(Debug, Clone)]
pub struct RawChunk {
    pub text: String,
    pub page: u32,
    pub in_page_ordinal: u32,
    pub global_ordinal: u32,
}

/// Splits `pages` into overlapping chunks targeting `target_words` words
/// with `overlap_words` of repeated tail between consecutive chunks. A
/// chunk never spans a page boundary mid-sentence unless a single sentence
/// alone exceeds `target_words`, in which case it is split on whitespace.
pub fn chunk_pages(pages: &[PageText], target_words: usize, overlap_words: usize) -> Vec<RawChunk> {
    let mut chunks = Vec::new();
    let mut global_ordinal = 0u32;

    for page in pages {
        let sentences = split_sentences(&page.text);
        let mut in_page_ordinal = 0u32;
        let mut current_words: Vec<String> = Vec::new();

        let mut i = 0;
        while i < sentences.len() {
            let sentence = &sentences[i];
            let sentence_words: Vec<&str> = sentence.split_whitespace().collect();

            if sentence_words.len() > target_words && current_words.is_empty() {
                // A lone sentence bigger than the target: split on whitespace.
                for piece in sentence_words.chunks(target_words) {
                    chunks.push(emit_chunk(piece.join(" "), page.page_number, in_page_ordinal, global_ordinal));
                    in_page_ordinal += 1;
                    global_ordinal += 1;
                }
                i += 1;
                continue;
            }

            if current_words.len() + sentence_words.len() > target_words && !current_words.is_empty() {
                chunks.push(emit_chunk(
                    current_words.join(" "),
                    page.page_number,
                    in_page_ordinal,
                    global_ordinal,
                ));
                in_page_ordinal += 1;
                global_ordinal += 1;

                let tail: Vec<String> = current_words
                    .iter()
                    .rev()
                    .take(overlap_words)
                    .rev()
                    .cloned()
                    .collect();
                current_words = tail;
                continue;
            }

            current_words.extend(sentence_words.into_iter().map(|s| s.to_string()));
            i += 1;
        }

        if !current_words.is_empty() {
            chunks.push(emit_chunk(
                current_words.join(" "),
                page.page_number,
                in_page_ordinal,
                global_ordinal,
            ));
            global_ordinal += 1;
        }
    }

    chunks
}

fn emit_chunk(text: String, page: u32, in_page_ordinal: u32, global_ordinal: u32) -> RawChunk {
    RawChunk {
        text,
        page,
        in_page_ordinal,
        global_ordinal,
    }
}

/// Minimal sentence splitter: breaks after `.`, `?`, `!` followed by
/// whitespace. Good enough for course-material prose; not a full NLP
/// tokenizer.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            let next_is_boundary = chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(true);
            if next_is_boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
        i += 1;
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page_number: n,
            text: text.to_string(),
        }
    }

    #[test]
    fn short_page_yields_single_chunk() {
        let pages = vec![page(1, "The quick brown fox jumps over the lazy dog.")];
        let chunks = chunk_pages(&pages, 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].global_ordinal, 0);
    }

    #[test]
    fn long_page_splits_with_overlap() {
        let sentence = "word ".repeat(50) + ". ";
        let long_text = sentence.repeat(20);
        let pages = vec![page(1, &long_text)];
        let chunks = chunk_pages(&pages, 500, 100);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.global_ordinal, i as u32);
        }
    }

    #[test]
    fn ordinals_continue_across_pages() {
        let pages = vec![page(1, "Page one sentence."), page(2, "Page two sentence.")];
        let chunks = chunk_pages(&pages, 500, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 2);
        assert_eq!(chunks[1].global_ordinal, 1);
        assert_eq!(chunks[1].in_page_ordinal, 0);
    }
}
