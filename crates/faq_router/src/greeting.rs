//! Greeting detection ahead of semantic search.
//!
//! Stages run in order and stop at the first hit: exact phrase, partial
//! (prefix or first token), then a cheap gate followed by fuzzy scoring.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStats, CachedMatch, SimilarityCache};
use crate::config::GreetingConfig;
use crate::normalize::{
    first_token, strip_leading_separators, tokens, Normalized, TextNormalizer,
};
use crate::similarity::Scorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Exact,
    Partial,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GreetingMatch {
    pub stage: MatchStage,
    /// The configured phrase that matched.
    pub pattern: String,
    pub category: String,
    pub threshold: f64,
    /// Only set by the fuzzy stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip)]
    key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GreetingOutcome {
    pub normalized: String,
    pub matched: Option<GreetingMatch>,
    /// Content left after removing the greeting. Empty when nothing matched.
    pub residual: String,
}

impl GreetingOutcome {
    pub fn is_greeting(&self) -> bool {
        self.matched.is_some()
    }

    pub fn is_pure_greeting(&self) -> bool {
        self.matched.is_some() && self.residual.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Phrase {
    text: String,
    key: String,
    first_token: String,
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    threshold: f64,
    keys: Vec<String>,
}

#[derive(Debug)]
pub struct GreetingMatcher {
    normalizer: TextNormalizer,
    phrases: Vec<Phrase>,
    partials: Vec<Phrase>,
    categories: Vec<Category>,
    default_category: String,
    default_threshold: f64,
    vocabulary: HashSet<String>,
    business_keywords: Vec<String>,
    scorer: Scorer,
    max_gate_len: usize,
    max_fuzzy_len: usize,
    log_threshold: f64,
    cache: Option<SimilarityCache>,
}

impl GreetingMatcher {
    /// Every configured list goes through the same normalizer as incoming
    /// messages, so "hello" is stored as "helo".
    pub fn new(config: &GreetingConfig) -> Self {
        let normalizer = TextNormalizer::new(&config.corrections);
        let phrase = |text: &String| -> Option<Phrase> {
            let key = normalizer.normalize(text);
            let first_token = first_token(&key).filter(|t| !t.is_empty())?.to_string();
            Some(Phrase {
                text: text.clone(),
                key,
                first_token,
            })
        };
        let phrases: Vec<Phrase> = config.phrases.iter().filter_map(phrase).collect();
        let partials: Vec<Phrase> = config.partial_phrases.iter().filter_map(phrase).collect();

        let categories = config
            .categories
            .iter()
            .map(|c| Category {
                name: c.name.clone(),
                threshold: c.threshold,
                keys: c
                    .phrases
                    .iter()
                    .map(|p| normalizer.normalize(p))
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect::<Vec<_>>();

        let default_threshold = categories
            .iter()
            .find(|c| c.name == config.default_category)
            .map(|c| c.threshold)
            .unwrap_or(config.default_threshold);

        let vocabulary = config
            .vocabulary
            .iter()
            .map(|w| normalizer.normalize(w))
            .filter(|w| !w.is_empty())
            .collect();
        let business_keywords = config
            .business_keywords
            .iter()
            .map(|w| normalizer.normalize(w))
            .filter(|w| !w.is_empty())
            .collect();

        let cache = config
            .cache
            .enabled
            .then(|| SimilarityCache::new(config.cache.capacity));

        Self {
            normalizer,
            phrases,
            partials,
            categories,
            default_category: config.default_category.clone(),
            default_threshold,
            vocabulary,
            business_keywords,
            scorer: config.scorer,
            max_gate_len: config.max_gate_len,
            max_fuzzy_len: config.max_fuzzy_len,
            log_threshold: config.log_threshold,
            cache,
        }
    }

    pub fn detect(&self, message: &str) -> GreetingOutcome {
        let normalized = self.normalizer.analyze(message);
        let matched = self.classify(&normalized);
        let residual = match &matched {
            Some(m) => {
                info!(
                    pattern = %m.pattern,
                    stage = ?m.stage,
                    similarity = m.similarity,
                    "greeting recognized"
                );
                self.extract_residual(&normalized, m)
            }
            None => String::new(),
        };

        GreetingOutcome {
            normalized: normalized.as_str().to_string(),
            matched,
            residual,
        }
    }

    pub fn classify(&self, normalized: &Normalized) -> Option<GreetingMatch> {
        let text = normalized.as_str();
        if text.is_empty() {
            return None;
        }

        if let Some(phrase) = self.phrases.iter().find(|p| p.key == text) {
            debug!(pattern = %phrase.text, "exact greeting");
            return Some(self.matched(MatchStage::Exact, phrase, None));
        }

        if let Some(phrase) = self.partial(text) {
            debug!(pattern = %phrase.text, "partial greeting");
            return Some(self.matched(MatchStage::Partial, phrase, None));
        }

        if self.is_potential_greeting(text) {
            return self.fuzzy(text);
        }

        None
    }

    /// Cheap gate before fuzzy scoring: short, has a greeting word, and
    /// carries no business keyword.
    pub fn is_potential_greeting(&self, normalized: &str) -> bool {
        if normalized.is_empty() || normalized.chars().count() > self.max_gate_len {
            return false;
        }
        if !tokens(normalized).any(|t| self.vocabulary.contains(t)) {
            return false;
        }
        !self
            .business_keywords
            .iter()
            .any(|w| normalized.contains(w.as_str()))
    }

    /// Category of a normalized phrase: the first category with a phrase
    /// contained in it, else the default category.
    pub fn category_for(&self, key: &str) -> (&str, f64) {
        self.categories
            .iter()
            .find(|c| c.keys.iter().any(|k| key.contains(k.as_str())))
            .map(|c| (c.name.as_str(), c.threshold))
            .unwrap_or((self.default_category.as_str(), self.default_threshold))
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(SimilarityCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn partial(&self, text: &str) -> Option<&Phrase> {
        if let Some(phrase) = self.partials.iter().find(|p| text.starts_with(&p.key)) {
            return Some(phrase);
        }
        let first = first_token(text).filter(|t| !t.is_empty())?;
        self.phrases.iter().find(|p| p.first_token == first)
    }

    fn fuzzy(&self, text: &str) -> Option<GreetingMatch> {
        let (result, hit) = match &self.cache {
            Some(cache) => cache.get_or_compute(CacheKey::new(text, self.phrases.len()), || {
                self.best_match(text)
            }),
            None => (self.best_match(text), false),
        };
        if hit {
            debug!(message = %text, "fuzzy match served from cache");
        }
        if !result.matched {
            return None;
        }

        let phrase = self.phrases.iter().find(|p| p.text == result.pattern)?;
        Some(self.matched(MatchStage::Fuzzy, phrase, Some(result.similarity)))
    }

    fn best_match(&self, text: &str) -> CachedMatch {
        let mut best: Option<&Phrase> = None;
        let mut best_similarity = 0.0f64;
        for phrase in &self.phrases {
            let similarity = self.scorer.similarity(text, &phrase.key, self.max_fuzzy_len);
            if similarity > best_similarity {
                best_similarity = similarity;
                best = Some(phrase);
            }
        }

        let Some(phrase) = best else {
            return CachedMatch {
                matched: false,
                similarity: 0.0,
                pattern: String::new(),
            };
        };

        let (category, threshold) = self.category_for(&phrase.key);
        let matched = best_similarity >= threshold;
        if best_similarity >= self.log_threshold {
            info!(
                message = %text,
                pattern = %phrase.text,
                category,
                similarity = format_args!("{best_similarity:.1}"),
                threshold = format_args!("{threshold:.1}"),
                matched,
                "fuzzy greeting match"
            );
        }

        CachedMatch {
            matched,
            similarity: best_similarity,
            pattern: phrase.text.clone(),
        }
    }

    fn matched(&self, stage: MatchStage, phrase: &Phrase, similarity: Option<f64>) -> GreetingMatch {
        let (category, threshold) = self.category_for(&phrase.key);
        GreetingMatch {
            stage,
            pattern: phrase.text.clone(),
            category: category.to_string(),
            threshold,
            similarity,
            key: phrase.key.clone(),
        }
    }

    fn extract_residual(&self, normalized: &Normalized, m: &GreetingMatch) -> String {
        let text = normalized.as_str();
        if text == m.key {
            return String::new();
        }
        if text.starts_with(&m.key) {
            return strip_leading_separators(normalized.canonical_tail(m.key.len())).to_string();
        }
        let first_matches = first_token(text)
            .filter(|t| !t.is_empty())
            .is_some_and(|first| self.phrases.iter().any(|p| p.first_token == first));
        if first_matches {
            return strip_leading_separators(normalized.canonical_without_first_token())
                .to_string();
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> GreetingMatcher {
        GreetingMatcher::new(&GreetingConfig::default())
    }

    #[test]
    fn exact_formal_phrase() {
        let m = matcher();
        for message in ["Good evening!", "Здравствуйте"] {
            let outcome = m.detect(message);
            let hit = outcome.matched.as_ref().expect("greeting");
            assert_eq!(hit.stage, MatchStage::Exact);
            assert_eq!(hit.category, "formal");
            assert_eq!(hit.threshold, 90.0);
            assert!(outcome.is_pure_greeting());
        }
    }

    #[test]
    fn corrected_misspelling_is_exact() {
        let m = matcher();
        let outcome = m.detect("Здраствуйте!");
        assert_eq!(outcome.matched.unwrap().pattern, "здравствуйте");
        let outcome = m.detect("добрый ден");
        assert_eq!(outcome.matched.unwrap().pattern, "добрый день");
    }

    #[test]
    fn greeting_followed_by_question() {
        let m = matcher();
        let outcome = m.detect("hello, how much does delivery cost?");
        let hit = outcome.matched.as_ref().expect("greeting");
        assert_eq!(hit.stage, MatchStage::Partial);
        assert_eq!(hit.pattern, "hello");
        assert_eq!(outcome.residual, "how much does delivery cost");
        assert!(!outcome.is_pure_greeting());
    }

    #[test]
    fn first_token_rule_drops_greeting_word() {
        let m = matcher();
        let outcome = m.detect("Hi, where is my order?");
        assert_eq!(outcome.matched.as_ref().unwrap().pattern, "hi");
        assert_eq!(outcome.residual, "where is my order");

        let outcome = m.detect("good question about refunds");
        assert_eq!(outcome.matched.as_ref().unwrap().stage, MatchStage::Partial);
        assert_eq!(outcome.residual, "question about refunds");
    }

    #[test]
    fn punctuation_before_the_greeting_word_is_not_skipped() {
        let m = matcher();
        for message in ["-- hello there", "... hi"] {
            let outcome = m.detect(message);
            assert!(
                outcome.matched.as_ref().map(|hit| hit.stage) != Some(MatchStage::Partial),
                "{message:?} matched partially"
            );
            assert!(outcome.residual.is_empty(), "{message:?} left {:?}", outcome.residual);
        }
    }

    #[test]
    fn exclamation_after_greeting_is_stripped_from_residual() {
        let m = matcher();
        let outcome = m.detect("Hello! How much is delivery?");
        assert_eq!(outcome.matched.as_ref().unwrap().stage, MatchStage::Partial);
        assert_eq!(outcome.residual, "how much is delivery");
    }

    #[test]
    fn how_questions_keep_their_first_word() {
        let m = matcher();
        assert!(!m.detect("How do I pay by card?").is_greeting());
        assert!(!m.detect("Как оплатить картой?").is_greeting());

        let outcome = m.detect("How are you?");
        let hit = outcome.matched.as_ref().expect("greeting");
        assert_eq!(hit.category, "question");
        assert!(outcome.is_pure_greeting());
        assert!(m.detect("Как дела?").is_pure_greeting());
    }

    #[test]
    fn residual_keeps_doubled_letters() {
        let m = matcher();
        let outcome = m.detect("Hello - I need a coffee refill");
        assert_eq!(outcome.residual, "i need a coffee refill");
    }

    #[test]
    fn repeated_letters_collapse_to_same_pattern() {
        let m = matcher();
        let tripled = m.detect("Hellllo!!!");
        let single = m.detect("Hello");
        assert_eq!(tripled.matched, single.matched);
        assert_eq!(tripled.matched.unwrap().stage, MatchStage::Exact);
    }

    #[test]
    fn one_char_typo_matches_fuzzily() {
        let m = matcher();
        let outcome = m.detect("Greeting!");
        let hit = outcome.matched.as_ref().expect("fuzzy greeting");
        assert_eq!(hit.stage, MatchStage::Fuzzy);
        assert_eq!(hit.pattern, "greetings");
        assert_eq!(hit.category, "informal");
        assert!(hit.similarity.unwrap() >= 85.0);
        assert!(outcome.is_pure_greeting());
    }

    #[test]
    fn formal_typo_matches_fuzzily() {
        let m = matcher();
        let hit = m.detect("добрй день").matched.expect("fuzzy greeting");
        assert_eq!(hit.stage, MatchStage::Fuzzy);
        assert_eq!(hit.pattern, "добрый день");
        assert_eq!(hit.category, "formal");
        assert!(hit.similarity.unwrap() >= 90.0);
    }

    #[test]
    fn below_threshold_is_not_a_greeting() {
        let m = matcher();
        let outcome = m.detect("Hallo");
        assert!(outcome.matched.is_none());
        assert!(outcome.residual.is_empty());
        // The negative result is cached too.
        assert_eq!(m.cache_stats().unwrap().size, 1);
    }

    #[test]
    fn business_keywords_block_the_gate() {
        let m = matcher();
        assert!(m.is_potential_greeting("halo there"));
        assert!(!m.is_potential_greeting("halo, payment"));
        assert!(!m.is_potential_greeting("where is it"));
        assert!(!m.is_potential_greeting(&format!("halo {}", "x".repeat(120))));
        assert!(m.detect("hallo, payment").matched.is_none());
    }

    #[test]
    fn ordinary_questions_pass_through() {
        let m = matcher();
        let outcome = m.detect("Where is my order?");
        assert!(!outcome.is_greeting());
        // Doubled letters in non-greeting text never reach a residual.
        let outcome = m.detect("Can I book a coffee class?");
        assert!(!outcome.is_greeting());
        assert!(outcome.residual.is_empty());
    }

    #[test]
    fn fuzzy_results_are_cached() {
        let m = matcher();
        m.detect("Greeting");
        m.detect("GREETING");
        assert_eq!(m.cache_stats().unwrap().size, 1);
        m.clear_cache();
        assert_eq!(m.cache_stats().unwrap().size, 0);
    }

    #[test]
    fn cache_can_be_disabled() {
        let mut config = GreetingConfig::default();
        config.cache.enabled = false;
        let m = GreetingMatcher::new(&config);
        assert!(m.detect("Greeting").is_greeting());
        assert!(m.cache_stats().is_none());
    }

    #[test]
    fn unknown_phrase_defaults_to_informal() {
        let m = matcher();
        assert_eq!(m.category_for("zzz"), ("informal", 85.0));
        assert_eq!(m.category_for("how are you"), ("question", 85.0));
    }

    #[test]
    fn scorer_strategy_is_configurable() {
        let m = matcher();
        assert!(m.detect("evening good").matched.is_none());

        let mut config = GreetingConfig::default();
        config.scorer = Scorer::TokenSortRatio;
        let m = GreetingMatcher::new(&config);
        let hit = m.detect("evening good").matched.expect("token sort match");
        assert_eq!(hit.pattern, "good evening");
        assert_eq!(hit.similarity, Some(100.0));
    }

    #[test]
    fn empty_message_is_not_a_greeting() {
        let m = matcher();
        assert!(!m.detect("").is_greeting());
        assert!(!m.detect("  ?! ").is_greeting());
    }
}
