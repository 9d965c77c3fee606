use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::similarity::Scorer;

pub const DEFAULT_KB_PATH: &str = "data/kb.jsonl";
pub const DEFAULT_INDEX_PATH: &str = "data/index.jsonl";
pub const DEFAULT_EMBEDDING_DIM: usize = 768;
pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MEDIUM_THRESHOLD: f32 = 0.6;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub embedding: EmbeddingConfig,
    pub greetings: GreetingConfig,
    pub router: RouterConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dim == 0 {
            return Err(ConfigError::Invalid("embedding.dim must be > 0".to_string()));
        }
        self.router.validate()?;
        self.greetings.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub knowledge_base: PathBuf,
    pub index: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            knowledge_base: PathBuf::from(DEFAULT_KB_PATH),
            index: PathBuf::from(DEFAULT_INDEX_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub high_threshold: f32,
    pub medium_threshold: f32,
    pub top_k: usize,
    pub timeout_ms: u64,
    pub greeting_reply: String,
    pub clarify_reply: String,
    pub escalate_reply: String,
    pub error_reply: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            medium_threshold: DEFAULT_MEDIUM_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            greeting_reply: "Hello! How can I help you?".into(),
            clarify_reply: "Could you clarify your question? Perhaps you meant:".into(),
            escalate_reply: "I did not understand the question, passing you to an operator."
                .into(),
            error_reply: "Something went wrong while processing your question, passing you to an operator."
                .into(),
        }
    }
}

impl RouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.high_threshold) || !in_unit(self.medium_threshold) {
            return Err(ConfigError::Invalid(
                "router thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.medium_threshold > self.high_threshold {
            return Err(ConfigError::Invalid(format!(
                "router.medium_threshold ({}) exceeds router.high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("router.top_k must be > 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "router.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A named greeting category. Phrases are matched by containment against the
/// winning fuzzy phrase; the first category that contains one wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingCategory {
    pub name: String,
    pub threshold: f64,
    pub phrases: Vec<String>,
}

impl GreetingCategory {
    fn new(name: &str, threshold: f64, phrases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            threshold,
            phrases: strings(phrases),
        }
    }
}

/// Full-string correction applied after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for GreetingCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    /// Canonical greeting phrases (exact and fuzzy stages, first-token rule).
    pub phrases: Vec<String>,
    /// Prefixes that mark a greeting followed by content.
    pub partial_phrases: Vec<String>,
    pub categories: Vec<GreetingCategory>,
    pub default_category: String,
    pub default_threshold: f64,
    /// Words that make a message a fuzzy-match candidate.
    pub vocabulary: Vec<String>,
    /// Any of these anywhere in the message disqualifies fuzzy matching.
    pub business_keywords: Vec<String>,
    pub corrections: Vec<Correction>,
    pub scorer: Scorer,
    pub max_gate_len: usize,
    pub max_fuzzy_len: usize,
    pub log_threshold: f64,
    pub cache: GreetingCacheConfig,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        // Question greetings stay out of `phrases`: their first words ("how",
        // "как") open ordinary questions too. They match as prefixes instead.
        let question_phrases = strings(&[
            "как дела",
            "как поживаете",
            "как настроение",
            "how are you",
            "how is it going",
        ]);

        let categories = vec![
            GreetingCategory::new(
                "formal",
                90.0,
                &[
                    "здравствуйте",
                    "добрый день",
                    "доброе утро",
                    "добрый вечер",
                    "good morning",
                    "good afternoon",
                    "good evening",
                    "good day",
                ],
            ),
            GreetingCategory::new(
                "informal",
                85.0,
                &[
                    "привет", "хай", "хелло", "хей", "hello", "hey", "hi", "greetings",
                ],
            ),
            GreetingCategory::new("short", 80.0, &["привет", "хай", "hi"]),
            GreetingCategory {
                name: "question".to_string(),
                threshold: 85.0,
                phrases: question_phrases.clone(),
            },
            GreetingCategory::new(
                "thanks",
                85.0,
                &["спасибо", "благодарю", "thank you", "thanks"],
            ),
        ];

        let mut phrases: Vec<String> = Vec::new();
        for phrase in categories
            .iter()
            .filter(|c| c.name != "question")
            .flat_map(|c| c.phrases.iter().cloned())
            .chain(strings(&[
                "доброго дня",
                "здрасьте",
                "hello there",
                "hi there",
                "hey there",
            ]))
        {
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
        }

        Self {
            phrases,
            partial_phrases: strings(&[
                "здравствуйте",
                "добрый день",
                "доброе утро",
                "добрый вечер",
                "привет",
                "hello",
                "hey there",
                "hi there",
                "good morning",
                "good afternoon",
                "good evening",
                "greetings",
            ])
            .into_iter()
            .chain(question_phrases)
            .collect(),
            categories,
            default_category: "informal".to_string(),
            default_threshold: 85.0,
            vocabulary: strings(&[
                "здравствуйте",
                "здраствуйте",
                "добрый",
                "доброе",
                "доброго",
                "добрй",
                "ден",
                "привет",
                "приветт",
                "хай",
                "хелло",
                "хей",
                "здрасьте",
                "здарова",
                "добреньки",
                "как",
                "все",
                "спасибо",
                "благодарю",
                "hello",
                "hallo",
                "hi",
                "hey",
                "heya",
                "hiya",
                "greeting",
                "greetings",
                "good",
                "morning",
                "afternoon",
                "evening",
                "thanks",
                "thank",
                "howdy",
            ]),
            business_keywords: strings(&[
                "вопрос",
                "проблема",
                "ошибка",
                "помощь",
                "заказ",
                "оплата",
                "доставка",
                "возврат",
                "жалоба",
                "претензия",
                "question",
                "problem",
                "error",
                "help",
                "order",
                "payment",
                "delivery",
                "refund",
                "complaint",
                "claim",
            ]),
            corrections: vec![
                correction("здраствуйте", "здравствуйте"),
                correction("здравствуйте", "здравствуйте"),
                correction("добрый ден", "добрый день"),
                correction("приветт", "привет"),
                correction("привет", "привет"),
            ],
            scorer: Scorer::Ratio,
            max_gate_len: 100,
            max_fuzzy_len: 50,
            log_threshold: 70.0,
            cache: GreetingCacheConfig::default(),
        }
    }
}

impl GreetingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "greetings.phrases must not be empty".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for category in &self.categories {
            if !names.insert(category.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate greeting category '{}'",
                    category.name
                )));
            }
            if !(0.0..=100.0).contains(&category.threshold) {
                return Err(ConfigError::Invalid(format!(
                    "greeting category '{}' threshold must be within [0, 100]",
                    category.name
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.default_threshold) {
            return Err(ConfigError::Invalid(
                "greetings.default_threshold must be within [0, 100]".to_string(),
            ));
        }
        if self.max_fuzzy_len == 0 {
            return Err(ConfigError::Invalid(
                "greetings.max_fuzzy_len must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn correction(from: &str, to: &str) -> Correction {
    Correction {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults are valid");
    }

    #[test]
    fn category_thresholds_match_defaults() {
        let config = GreetingConfig::default();
        let thresholds: Vec<(&str, f64)> = config
            .categories
            .iter()
            .map(|c| (c.name.as_str(), c.threshold))
            .collect();
        assert_eq!(
            thresholds,
            vec![
                ("formal", 90.0),
                ("informal", 85.0),
                ("short", 80.0),
                ("question", 85.0),
                ("thanks", 85.0),
            ]
        );
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [data]
            knowledge_base = "/srv/faq/kb.jsonl"

            [router]
            top_k = 5

            [greetings]
            scorer = "token_set_ratio"
            "#,
        )
        .expect("parse");

        assert_eq!(config.data.knowledge_base, PathBuf::from("/srv/faq/kb.jsonl"));
        assert_eq!(config.data.index, PathBuf::from(DEFAULT_INDEX_PATH));
        assert_eq!(config.router.top_k, 5);
        assert_eq!(config.router.high_threshold, DEFAULT_HIGH_THRESHOLD);
        assert_eq!(config.greetings.scorer, Scorer::TokenSetRatio);
        assert_eq!(config.greetings.cache.capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = Config::from_toml_str(
            r#"
            [router]
            high_threshold = 0.5
            medium_threshold = 0.7
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_scorer() {
        let err = Config::from_toml_str("[greetings]\nscorer = \"soundex\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
