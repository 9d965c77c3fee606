//! The request-facing service: one-shot initialization, readiness, and the
//! greeting gate in front of semantic search.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheStats;
use crate::config::Config;
use crate::embed::EmbeddingProvider;
use crate::error::{InitError, QueryError};
use crate::greeting::{GreetingMatcher, GreetingOutcome};
use crate::index::SemanticIndex;
use crate::model::{Answer, Readiness, RoutedResponse, SearchHit};
use crate::router::AnswerRouter;
use crate::storage;

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    pub exists: bool,
}

impl FileStatus {
    fn probe(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: path.is_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub knowledge_base: FileStatus,
    pub index: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_cache: Option<CacheStats>,
}

/// One embedding up front so an unusable model fails initialization.
fn check_embedder(embedder: &dyn EmbeddingProvider, dim: usize) -> Result<(), InitError> {
    let vector = embedder
        .embed("hello")
        .map_err(|err| InitError::Embedder(format!("{err:#}")))?;
    if vector.len() != dim {
        return Err(InitError::Embedder(format!(
            "model produces dimension {}, index expects {dim}",
            vector.len()
        )));
    }
    Ok(())
}

pub struct FaqService {
    config: Config,
    matcher: GreetingMatcher,
    router: AnswerRouter,
    embedder: Arc<dyn EmbeddingProvider>,
    index: OnceLock<Result<Arc<SemanticIndex>, InitError>>,
}

impl std::fmt::Debug for FaqService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaqService")
            .field("readiness", &self.readiness())
            .finish_non_exhaustive()
    }
}

impl FaqService {
    pub fn new(config: Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let matcher = GreetingMatcher::new(&config.greetings);
        let router = AnswerRouter::new(config.router.clone());
        Self {
            config,
            matcher,
            router,
            embedder,
            index: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the knowledge base and index named in the config.
    pub fn initialize(&self) -> Result<(), InitError> {
        let data = &self.config.data;
        let dim = self.config.embedding.dim;
        let embedder = Arc::clone(&self.embedder);
        self.initialize_with(|| {
            let knowledge = storage::load_knowledge_base(&data.knowledge_base)?;
            let index = storage::load_index(&data.index, &knowledge, dim)?;
            check_embedder(embedder.as_ref(), dim)?;
            SemanticIndex::new(embedder, Box::new(index), knowledge)
        })
    }

    /// Run `load` at most once. Concurrent callers wait for the first one and
    /// all observe the same outcome; later calls return the stored result.
    pub fn initialize_with<F>(&self, load: F) -> Result<(), InitError>
    where
        F: FnOnce() -> Result<SemanticIndex, InitError>,
    {
        let result = self.index.get_or_init(|| match load() {
            Ok(index) => {
                info!(entries = index.knowledge().len(), dim = index.dim(), "search ready");
                Ok(Arc::new(index))
            }
            Err(err) => {
                warn!(error = %err, "search initialization failed");
                Err(err)
            }
        });
        result.as_ref().map(|_| ()).map_err(|err| err.clone())
    }

    pub fn readiness(&self) -> Readiness {
        match self.index.get() {
            None => Readiness::Uninitialized,
            Some(Ok(_)) => Readiness::Ready,
            Some(Err(_)) => Readiness::Failed,
        }
    }

    pub fn health(&self) -> HealthReport {
        let (entries, error) = match self.index.get() {
            Some(Ok(index)) => (Some(index.knowledge().len()), None),
            Some(Err(err)) => (None, Some(err.to_string())),
            None => (None, None),
        };
        HealthReport {
            status: self.readiness(),
            knowledge_base: FileStatus::probe(&self.config.data.knowledge_base),
            index: FileStatus::probe(&self.config.data.index),
            entries,
            error,
            greeting_cache: self.matcher.cache_stats(),
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.matcher.cache_stats()
    }

    pub fn detect(&self, message: &str) -> GreetingOutcome {
        self.matcher.detect(message)
    }

    pub async fn classify_and_answer(&self, message: &str) -> RoutedResponse {
        self.answer(message).await.response
    }

    /// Greeting gate first; anything else (or the content after a greeting)
    /// goes to search and through the confidence tiers.
    pub async fn answer(&self, message: &str) -> Answer {
        let outcome = self.matcher.detect(message);
        if outcome.is_pure_greeting() {
            return self.router.greeting();
        }

        let query = if outcome.is_greeting() {
            outcome.residual
        } else {
            message.to_string()
        };
        if query.trim().is_empty() {
            return self.router.route(Ok(Vec::new()));
        }

        let hits = self.search(query).await;
        self.router.route(hits)
    }

    /// Search on the blocking pool under the configured timeout.
    pub async fn search(&self, query: String) -> Result<Vec<SearchHit>, QueryError> {
        let index = match self.index.get() {
            Some(Ok(index)) => Arc::clone(index),
            _ => return Err(QueryError::NotReady),
        };
        let k = self.config.router.top_k;
        let timeout = self.config.router.timeout();

        let task = tokio::task::spawn_blocking(move || index.search(&query, k));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(QueryError::Worker(join.to_string())),
            Err(_) => Err(QueryError::Timeout(timeout)),
        }
    }
}
