//! Approximate string similarity on a 0..=100 scale.
//!
//! All scorers are built on the normalized indel similarity
//! `2 * lcs(a, b) / (|a| + |b|)`, computed over chars.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    #[default]
    Ratio,
    PartialRatio,
    TokenSortRatio,
    TokenSetRatio,
}

impl Scorer {
    pub fn score(self, a: &str, b: &str) -> f64 {
        let raw = match self {
            Scorer::Ratio => ratio(a, b),
            Scorer::PartialRatio => partial_ratio(a, b),
            Scorer::TokenSortRatio => token_sort_ratio(a, b),
            Scorer::TokenSetRatio => token_set_ratio(a, b),
        };
        raw.clamp(0.0, 100.0)
    }

    /// Score with the empty-input and length-cap rules used by greeting matching.
    pub fn similarity(self, a: &str, b: &str, max_len: usize) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a.chars().count() > max_len || b.chars().count() > max_len {
            let a = truncate_chars(a, max_len);
            let b = truncate_chars(b, max_len);
            return self.score(a, b);
        }
        self.score(a, b)
    }
}

pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    indel_ratio(&a, &b)
}

/// Best `ratio` of the shorter string against any equally long window of the
/// longer one, including windows clipped at either edge.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }

    let mut best = 0.0f64;
    for start in 0..=(long.len() - short.len()) {
        best = best.max(indel_ratio(&short, &long[start..start + short.len()]));
        if best >= 100.0 {
            return 100.0;
        }
    }
    for edge in 1..short.len() {
        best = best
            .max(indel_ratio(&short, &long[..edge]))
            .max(indel_ratio(&short, &long[long.len() - edge..]));
    }
    best
}

pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    if !sect.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = sect.join(" ");
    let join = |rest: &[&str]| {
        if sect.is_empty() {
            rest.join(" ")
        } else {
            format!("{sect} {}", rest.join(" "))
        }
    };
    let combined_a = join(&only_a);
    let combined_b = join(&only_b);

    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_a))
            .max(ratio(&sect, &combined_b));
    }
    best
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn truncate_chars(text: &str, max_len: usize) -> &str {
    match text.char_indices().nth(max_len) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    100.0 * (2 * lcs_len(a, b)) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ratio_counts_insertions_and_deletions() {
        assert!(approx(ratio("helo", "helo"), 100.0));
        // one deletion: 2 * 7 / 15
        assert!(approx(ratio("greting", "gretings"), 1400.0 / 15.0));
        // one substitution costs two indel operations
        assert!(approx(ratio("halo", "helo"), 75.0));
        assert!(approx(ratio("abc", "xyz"), 0.0));
    }

    #[test]
    fn ratio_works_on_chars_not_bytes() {
        assert!(approx(ratio("привет", "привт"), 100.0 * 10.0 / 11.0));
    }

    #[test]
    fn partial_ratio_finds_substring() {
        assert!(approx(partial_ratio("helo", "oh helo there"), 100.0));
        assert!(partial_ratio("there", "helo ther") > 80.0);
        assert!(approx(partial_ratio("", ""), 100.0));
        assert!(approx(partial_ratio("", "abc"), 0.0));
    }

    #[test]
    fn token_sort_ignores_order() {
        assert!(approx(token_sort_ratio("evening god", "god evening"), 100.0));
        assert!(ratio("evening god", "god evening") < 100.0);
    }

    #[test]
    fn token_set_handles_subsets() {
        assert!(approx(token_set_ratio("god evening", "god evening team"), 100.0));
        let partial = token_set_ratio("god morning", "god evening");
        assert!(partial > 0.0 && partial < 100.0);
        assert!(approx(token_set_ratio("", "god"), 0.0));
    }

    #[test]
    fn similarity_guards_empty_and_truncates() {
        assert!(approx(Scorer::Ratio.similarity("", "helo", 50), 0.0));
        let long_a = format!("helo {}", "x".repeat(80));
        let long_b = format!("helo {}", "x".repeat(60));
        // Both cut to 10 chars, identical after truncation.
        assert!(approx(Scorer::Ratio.similarity(&long_a, &long_b, 10), 100.0));
    }

    #[test]
    fn scores_stay_in_range() {
        let pairs = [("a", "b"), ("helo", "h"), ("god day", "day god god"), ("x y", "y")];
        for scorer in [
            Scorer::Ratio,
            Scorer::PartialRatio,
            Scorer::TokenSortRatio,
            Scorer::TokenSetRatio,
        ] {
            for (a, b) in pairs {
                let s = scorer.similarity(a, b, 50);
                assert!((0.0..=100.0).contains(&s), "{scorer:?} {a} {b} -> {s}");
            }
        }
    }
}
