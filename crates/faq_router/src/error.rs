use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal to the search capability. Stored once in the service, so it is `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    #[error("{kind} file not found: {}", path.display())]
    Missing { kind: &'static str, path: PathBuf },

    #[error("failed to read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("{}:{line}: malformed record: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("duplicate knowledge base id '{id}' at line {line}")]
    DuplicateId { id: String, line: usize },

    #[error("index does not match knowledge base: {0}")]
    IndexMismatch(String),

    #[error("embedding model unavailable: {0}")]
    Embedder(String),
}

/// Recoverable failure of a single query; the router turns it into a degraded reply.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("search capability is not ready")]
    NotReady,

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("query embedding has dimension {actual}, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("search worker failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
