//! Nearest-neighbor lookup over question embeddings.

use std::sync::Arc;

use rayon::prelude::*;

use crate::embed::{dot, normalize_l2, EmbeddingProvider};
use crate::error::{InitError, QueryError};
use crate::knowledge::KnowledgeBase;
use crate::model::SearchHit;
use crate::normalize::fold_for_embedding;

/// Zero for mismatched lengths and for zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norms = (dot(a, a) * dot(b, b)).sqrt();
    if norms == 0.0 {
        0.0
    } else {
        dot(a, b) / norms
    }
}

/// Ranked `(row, score)` lookup. Results are sorted by descending score and
/// hold at most `k` rows; asking for more rows than exist is not an error.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dim(&self) -> usize;

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, QueryError>;
}

/// Exhaustive cosine index; rows are stored at unit length.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    rows: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self, InitError> {
        let mut rows = rows;
        for (row, vector) in rows.iter_mut().enumerate() {
            if vector.len() != dim {
                return Err(InitError::IndexMismatch(format!(
                    "row {row} has dimension {}, expected {dim}",
                    vector.len()
                )));
            }
            normalize_l2(vector);
        }
        Ok(Self { dim, rows })
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, QueryError> {
        if query.len() != self.dim {
            return Err(QueryError::Dimension {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .par_iter()
            .enumerate()
            .map(|(row, vector)| (row, cosine_similarity(query, vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Embedder, vector index and knowledge base joined into one searchable unit.
pub struct SemanticIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Box<dyn VectorIndex>,
    knowledge: KnowledgeBase,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("rows", &self.index.len())
            .field("dim", &self.index.dim())
            .finish_non_exhaustive()
    }
}

impl SemanticIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Box<dyn VectorIndex>,
        knowledge: KnowledgeBase,
    ) -> Result<Self, InitError> {
        if index.len() != knowledge.len() {
            return Err(InitError::IndexMismatch(format!(
                "index has {} rows, knowledge base has {} entries",
                index.len(),
                knowledge.len()
            )));
        }
        Ok(Self {
            embedder,
            index,
            knowledge,
        })
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// Embed `query` and return up to `k` entries, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, QueryError> {
        let folded = fold_for_embedding(query);
        let mut vector = self.embedder.embed(&folded).map_err(QueryError::Embedding)?;
        if vector.len() != self.index.dim() {
            return Err(QueryError::Dimension {
                expected: self.index.dim(),
                actual: vector.len(),
            });
        }
        normalize_l2(&mut vector);

        let hits = self
            .index
            .search(&vector, k)?
            .into_iter()
            .filter_map(|(row, score)| {
                self.knowledge.get(row).map(|entry| SearchHit {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            hits = hits.len(),
            best = hits.first().map(|h| h.score),
            "semantic search"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use crate::model::QaEntry;

    fn entry(id: &str, question: &str) -> QaEntry {
        QaEntry {
            id: id.to_string(),
            question: question.to_string(),
            answer: format!("answer-{id}"),
            normalized_question: fold_for_embedding(question),
        }
    }

    #[test]
    fn cosine_ignores_magnitude_and_degenerate_input() {
        assert!((cosine_similarity(&[3.0, 4.0], &[0.6, 0.8]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn flat_index_ranks_descending_and_truncates() {
        let index = FlatIndex::new(
            2,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
        )
        .expect("index");

        let hits = index.search(&[1.0, 0.0], 2).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn k_beyond_corpus_and_empty_corpus_are_fine() {
        let index = FlatIndex::new(2, vec![vec![1.0, 0.0]]).expect("index");
        assert_eq!(index.search(&[1.0, 0.0], 10).expect("search").len(), 1);

        let empty = FlatIndex::new(2, Vec::new()).expect("index");
        assert!(empty.is_empty());
        assert!(empty.search(&[1.0, 0.0], 3).expect("search").is_empty());
    }

    #[test]
    fn flat_index_rejects_ragged_rows() {
        let err = FlatIndex::new(3, vec![vec![1.0, 0.0, 0.0], vec![1.0]]).expect_err("ragged");
        assert!(matches!(err, InitError::IndexMismatch(_)));
    }

    #[test]
    fn semantic_index_finds_identical_question() {
        let embedder = HashEmbeddingProvider::new(64);
        let kb = KnowledgeBase::new(vec![
            entry("q000", "Where is my order?"),
            entry("q001", "How can I pay by card?"),
        ])
        .expect("kb");
        let rows = kb
            .entries()
            .iter()
            .map(|e| embedder.embed(&e.normalized_question).expect("embed"))
            .collect();
        let index = FlatIndex::new(64, rows).expect("index");
        let semantic =
            SemanticIndex::new(Arc::new(embedder), Box::new(index), kb).expect("semantic");

        let hits = semantic.search("  HOW can I pay   by card? ", 3).expect("search");
        assert_eq!(hits[0].entry.id, "q001");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn semantic_index_requires_matching_row_count() {
        let kb = KnowledgeBase::new(vec![entry("q000", "a")]).expect("kb");
        let index = FlatIndex::new(8, Vec::new()).expect("index");
        let err = SemanticIndex::new(Arc::new(HashEmbeddingProvider::new(8)), Box::new(index), kb)
            .expect_err("mismatch");
        assert!(matches!(err, InitError::IndexMismatch(_)));
    }

    #[test]
    fn semantic_index_reports_dimension_mismatch() {
        let kb = KnowledgeBase::new(vec![entry("q000", "a")]).expect("kb");
        let index = FlatIndex::new(16, vec![vec![1.0; 16]]).expect("index");
        let semantic = SemanticIndex::new(Arc::new(HashEmbeddingProvider::new(8)), Box::new(index), kb)
            .expect("semantic");
        let err = semantic.search("a", 3).expect_err("dimension");
        assert!(matches!(
            err,
            QueryError::Dimension {
                expected: 16,
                actual: 8
            }
        ));
    }
}
