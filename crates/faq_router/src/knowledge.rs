use std::collections::HashSet;

use crate::error::InitError;
use crate::model::QaEntry;

/// Ordered question/answer records. Row `i` here is row `i` of the vector index.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<QaEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<QaEntry>) -> Result<Self, InitError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (row, entry) in entries.iter().enumerate() {
            if !seen.insert(entry.id.as_str()) {
                return Err(InitError::DuplicateId {
                    id: entry.id.clone(),
                    line: row + 1,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&QaEntry> {
        self.entries.get(row)
    }

    pub fn entries(&self) -> &[QaEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, question: &str) -> QaEntry {
        QaEntry {
            id: id.to_string(),
            question: question.to_string(),
            answer: format!("answer to {question}"),
            normalized_question: question.to_lowercase(),
        }
    }

    #[test]
    fn keeps_row_order() {
        let kb = KnowledgeBase::new(vec![
            entry("q000", "Where is my order?"),
            entry("q002", "How do I pay?"),
        ])
        .expect("kb");
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.get(1).map(|e| e.id.as_str()), Some("q002"));
        assert_eq!(
            kb.get(0).map(|e| e.question.as_str()),
            Some("Where is my order?")
        );
        assert!(kb.get(2).is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = KnowledgeBase::new(vec![entry("q1", "a"), entry("q2", "b"), entry("q1", "c")])
            .expect_err("duplicate");
        assert_eq!(
            err,
            InitError::DuplicateId {
                id: "q1".to_string(),
                line: 3
            }
        );
    }
}
