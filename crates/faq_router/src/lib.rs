pub mod cache;
pub mod config;
pub mod embed;
pub mod error;
pub mod eval;
pub mod greeting;
pub mod index;
pub mod ingest;
pub mod knowledge;
pub mod model;
pub mod normalize;
pub mod router;
pub mod service;
pub mod similarity;
pub mod storage;

pub use cache::{CacheKey, CacheStats, CachedMatch, SimilarityCache};
pub use config::{
    Config, Correction, DataConfig, EmbeddingConfig, GreetingCacheConfig, GreetingCategory,
    GreetingConfig, RouterConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_EMBEDDING_DIM,
    DEFAULT_HIGH_THRESHOLD, DEFAULT_INDEX_PATH, DEFAULT_KB_PATH, DEFAULT_MEDIUM_THRESHOLD,
    DEFAULT_TIMEOUT_MS, DEFAULT_TOP_K,
};
pub use embed::{normalize_l2, EmbeddingProvider, HashEmbeddingProvider};
pub use error::{ConfigError, InitError, QueryError};
pub use eval::{evaluate_cases, load_cases, CaseExpectation, EvalCase, EvalOutcome, EvalSummary};
pub use greeting::{GreetingMatch, GreetingMatcher, GreetingOutcome, MatchStage};
pub use index::{cosine_similarity, FlatIndex, SemanticIndex, VectorIndex};
pub use ingest::{build_index, clean_rows, read_rows, IngestReport, RawRow};
pub use knowledge::KnowledgeBase;
pub use model::{Answer, QaEntry, Readiness, Route, RoutedResponse, SearchHit, Tier};
pub use normalize::{fold_for_embedding, Normalized, TextNormalizer};
pub use router::AnswerRouter;
pub use service::{FaqService, FileStatus, HealthReport};
pub use similarity::Scorer;
pub use storage::{
    load_index, load_knowledge_base, save_index, save_jsonl, save_knowledge_base, IndexRecord,
};
