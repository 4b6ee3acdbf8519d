/// Default LINE text message limit, in characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 5000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Maximum message length must be positive, got {0}")]
    InvalidMaxLen(i64),
}

/// Splits replies into chunks that fit a platform's per-message limit.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_len: usize,
}

impl Segmenter {
    /// Build a segmenter from a configured limit. Zero and negative limits are rejected.
    pub fn new(max_len: i64) -> Result<Self, SegmentError> {
        if max_len <= 0 {
            return Err(SegmentError::InvalidMaxLen(max_len));
        }
        let max_len = usize::try_from(max_len).map_err(|_| SegmentError::InvalidMaxLen(max_len))?;
        Ok(Self { max_len })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        segment(text, self.max_len)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

/// Split `text` into chunks of at most `max_len` characters.
///
/// Paragraph breaks are preferred, then line breaks, sentence ends and
/// whitespace; a run with none of those is cut hard at `max_len`. Whitespace
/// is only dropped where a split happens.
pub fn split_message(text: &str, max_len: usize) -> Result<Vec<String>, SegmentError> {
    if max_len == 0 {
        return Err(SegmentError::InvalidMaxLen(0));
    }
    Ok(segment(text, max_len))
}

fn segment(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut units = Vec::new();
    split_units(text, max_len, 0, &mut units);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut after_split = false;

    for unit in units {
        let unit = if after_split && current.is_empty() {
            unit.trim_start()
        } else {
            unit
        };
        if unit.is_empty() {
            continue;
        }
        let unit_len = char_len(unit);

        if current_len + unit_len > max_len {
            push_chunk(&mut chunks, current.trim_end());
            current.clear();
            after_split = true;

            let unit = unit.trim_start();
            current.push_str(unit);
            current_len = char_len(unit);
        } else {
            current.push_str(unit);
            current_len += unit_len;
        }
    }
    push_chunk(&mut chunks, &current);

    // Whitespace-only input trims away to nothing; deliver it raw instead.
    if chunks.is_empty() {
        let mut pieces = Vec::new();
        hard_split(text, max_len, &mut pieces);
        chunks = pieces.into_iter().map(str::to_string).collect();
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Boundaries tried in order when a piece is longer than the limit.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

impl Boundary {
    /// Split keeping each delimiter attached to the piece it ends.
    fn split(self, text: &str) -> Vec<&str> {
        match self {
            Self::Paragraph => text.split_inclusive("\n\n").collect(),
            Self::Line => text.split_inclusive('\n').collect(),
            Self::Sentence => split_sentences(text),
            Self::Word => text.split_inclusive(char::is_whitespace).collect(),
        }
    }
}

/// Flatten `text` into contiguous units of at most `max_len` characters.
fn split_units<'a>(text: &'a str, max_len: usize, level: usize, out: &mut Vec<&'a str>) {
    if char_len(text) <= max_len {
        out.push(text);
        return;
    }
    match BOUNDARIES.get(level) {
        Some(boundary) => {
            for piece in boundary.split(text) {
                split_units(piece, max_len, level + 1, out);
            }
        }
        None => hard_split(text, max_len, out),
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        let ends_sentence = match c {
            '.' | '!' | '?' => chars.peek().is_some_and(|&(_, next)| next.is_whitespace()),
            '。' | '！' | '？' => true,
            _ => false,
        };
        if !ends_sentence {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            chars.next();
        }
        let end = chars.peek().map_or(text.len(), |&(i, _)| i);
        pieces.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn hard_split<'a>(text: &'a str, max_len: usize, out: &mut Vec<&'a str>) {
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == max_len {
            out.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn visible(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_short_message() {
        let chunks = split_message("hello", 5000).unwrap();
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn test_split_exact_limit_is_single_chunk() {
        let text = "a".repeat(40);
        let chunks = split_message(&text, 40).unwrap();
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_message("", 10).unwrap().is_empty());
    }

    #[test]
    fn test_zero_max_len_rejected() {
        assert_eq!(
            split_message("hello", 0).unwrap_err(),
            SegmentError::InvalidMaxLen(0)
        );
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        assert_eq!(Segmenter::new(0).unwrap_err(), SegmentError::InvalidMaxLen(0));
        assert_eq!(
            Segmenter::new(-5).unwrap_err(),
            SegmentError::InvalidMaxLen(-5)
        );
        assert_eq!(Segmenter::new(12).unwrap().max_len(), 12);
        assert_eq!(Segmenter::default().max_len(), 5000);
    }

    #[test]
    fn test_paragraph_aligned_prose() {
        // 15 paragraphs of 800 characters including the blank-line separator.
        let paragraph = format!("{}.", "word ".repeat(159).trim_end());
        assert_eq!(paragraph.len(), 795);
        let paragraphs: Vec<String> = (0..15).map(|i| format!("P{:02}{}", i, paragraph)).collect();
        let text = paragraphs.join("\n\n");
        assert_eq!(text.chars().count(), 12_000 - 2);

        let chunks = split_message(&text, 5000).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], paragraphs[0..6].join("\n\n"));
        assert_eq!(chunks[1], paragraphs[6..12].join("\n\n"));
        assert_eq!(chunks[2], paragraphs[12..15].join("\n\n"));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5000);
            assert!(chunk.starts_with('P'));
        }
    }

    #[test]
    fn test_unbroken_token_hard_split() {
        let text = "x".repeat(6000);
        let chunks = split_message(&text, 5000).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 5000);
        assert_eq!(chunks[1].len(), 1000);
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let text = "First sentence here. Second one is longer text.";
        let chunks = split_message(text, 25).unwrap();
        assert_eq!(chunks[0], "First sentence here.");
        assert_eq!(chunks[1], "Second one is longer");
        assert_eq!(chunks[2], "text.");
    }

    #[test]
    fn test_prefers_line_break() {
        let text = "line1\nline2\nline3\nline4";
        let chunks = split_message(text, 12).unwrap();
        assert_eq!(chunks, vec!["line1\nline2", "line3\nline4"]);
    }

    #[test]
    fn test_word_boundary_before_hard_split() {
        let text = "alpha beta gamma delta";
        let chunks = split_message(text, 11).unwrap();
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_long_word_inside_sentence() {
        let text = format!("ok {} end", "z".repeat(25));
        let chunks = split_message(&text, 10).unwrap();
        assert_eq!(chunks, vec!["ok", "zzzzzzzzzz", "zzzzzzzzzz", "zzzzz end"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Thai and Japanese text are multi-byte in UTF-8.
        let text = "สวัสดี".repeat(10);
        let chunks = split_message(&text, 30).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_cjk_sentence_end() {
        let text = "今日は晴れです。明日は雨でしょう。";
        let chunks = split_message(text, 9).unwrap();
        assert_eq!(chunks, vec!["今日は晴れです。", "明日は雨でしょう。"]);
    }

    #[test]
    fn test_whitespace_only_input_still_delivered() {
        let text = " ".repeat(25);
        let chunks = split_message(&text, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "One. Two! Three?\n\nFour\nfive six seven.".repeat(20);
        assert_eq!(
            split_message(&text, 17).unwrap(),
            split_message(&text, 17).unwrap()
        );
    }

    proptest! {
        #[test]
        fn short_text_is_single_chunk(text in "[a-z .!?\n]{1,60}") {
            let chunks = split_message(&text, 60).unwrap();
            prop_assert_eq!(chunks, vec![text]);
        }

        #[test]
        fn chunks_respect_limit_and_content(
            text in "[a-zA-Zก-ฮ .!?。\n]{0,400}",
            max_len in 1usize..80,
        ) {
            let chunks = split_message(&text, max_len).unwrap();
            prop_assert_eq!(chunks.is_empty(), text.is_empty());
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.chars().count() <= max_len);
            }
            prop_assert_eq!(visible(&chunks.concat()), visible(&text));
        }
    }
}
