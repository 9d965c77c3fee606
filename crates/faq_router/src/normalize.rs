//! Text canonicalization for greeting matching.
//!
//! `normalize` is deliberately lossy: runs of the same character collapse to
//! one so that "hiii" and "hi" compare equal. Content that survives a greeting
//! is cut from the lossless form kept by [`Normalized`], so doubled letters in
//! the actual question are preserved.

use std::collections::HashMap;

use crate::config::Correction;

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    corrections: HashMap<String, String>,
}

/// Result of [`TextNormalizer::analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    text: String,
    canonical: String,
    /// For the i-th char of `text`, the byte offset in `canonical` where its run ends.
    /// `None` once a correction has replaced the string.
    run_ends: Option<Vec<usize>>,
}

impl Normalized {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The canonical text that follows the first `prefix_len` bytes of the
    /// normalized text. `prefix_len` must be a char boundary of `as_str()`.
    pub fn canonical_tail(&self, prefix_len: usize) -> &str {
        match &self.run_ends {
            Some(ends) => {
                let chars = self.text[..prefix_len].chars().count();
                if chars == 0 {
                    &self.canonical
                } else {
                    &self.canonical[ends[chars - 1]..]
                }
            }
            None => &self.text[prefix_len..],
        }
    }

    /// Canonical text with the first whitespace token removed.
    pub fn canonical_without_first_token(&self) -> &str {
        let source = if self.run_ends.is_some() {
            &self.canonical
        } else {
            &self.text
        };
        match source.split_once(' ') {
            Some((_, rest)) => rest,
            None => "",
        }
    }
}

impl TextNormalizer {
    pub fn new(corrections: &[Correction]) -> Self {
        let mut table = HashMap::with_capacity(corrections.len());
        for c in corrections {
            // First entry for a key wins.
            table.entry(c.from.clone()).or_insert_with(|| c.to.clone());
        }
        Self { corrections: table }
    }

    pub fn normalize(&self, text: &str) -> String {
        self.analyze(text).text
    }

    pub fn analyze(&self, text: &str) -> Normalized {
        let canonical = canonicalize(text);
        let (collapsed, run_ends) = collapse_repeats(&canonical);

        match self.corrections.get(&collapsed) {
            Some(fixed) if *fixed != collapsed => Normalized {
                text: fixed.clone(),
                canonical,
                run_ends: None,
            },
            _ => Normalized {
                text: collapsed,
                canonical,
                run_ends: Some(run_ends),
            },
        }
    }
}

/// Lowercase, strip trailing `.`/`!`/`?` runs, collapse whitespace.
pub fn canonicalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped =
        lowered.trim_end_matches(|c: char| matches!(c, '.' | '!' | '?') || c.is_whitespace());
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, trim, collapse whitespace. Applied to questions before embedding.
pub fn fold_for_embedding(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse every run of an identical char to a single instance.
pub fn collapse_repeats(text: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(text.len());
    let mut run_ends: Vec<usize> = Vec::with_capacity(text.len());
    let mut prev: Option<char> = None;

    for (offset, ch) in text.char_indices() {
        let end = offset + ch.len_utf8();
        if prev == Some(ch) {
            if let Some(last) = run_ends.last_mut() {
                *last = end;
            }
            continue;
        }
        out.push(ch);
        run_ends.push(end);
        prev = Some(ch);
    }

    (out, run_ends)
}

fn is_separator(c: char) -> bool {
    matches!(c, ',' | '.' | '-' | ':' | ';' | '!' | '?')
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(is_separator)
}

/// Whitespace tokens with surrounding punctuation trimmed; empty tokens dropped.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(trim_token)
        .filter(|t| !t.is_empty())
}

/// The first whitespace token, trimmed. Empty when that token is all
/// punctuation; the next word never stands in for it.
pub fn first_token(text: &str) -> Option<&str> {
    text.split_whitespace().next().map(trim_token)
}

/// Strip leading separators (`, . - : ; ! ?`) and surrounding whitespace.
pub fn strip_leading_separators(text: &str) -> &str {
    text.trim_start()
        .trim_start_matches(|c: char| is_separator(c) || c.is_whitespace())
        .trim()
}
