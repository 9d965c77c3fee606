//! Offline build of the knowledge base and index from a question/answer table.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embed::EmbeddingProvider;
use crate::model::QaEntry;
use crate::normalize::fold_for_embedding;
use crate::storage::IndexRecord;

/// A source row before cleaning. Missing or blank cells drop the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub rows: usize,
    pub kept: usize,
    pub dropped_empty: usize,
    pub dropped_duplicate: usize,
}

/// Read `.csv` (with `question` and `answer` headers) or `.jsonl` rows.
pub fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(path),
        "jsonl" | "ndjson" => read_jsonl(path),
        other => bail!(
            "unsupported source format '{other}' for {} (expected .csv or .jsonl)",
            path.display()
        ),
    }
}

fn read_csv(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;

    let headers = reader.headers().context("read csv header")?.clone();
    for column in ["question", "answer"] {
        if !headers.iter().any(|h| h == column) {
            bail!("{} is missing the '{column}' column", path.display());
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<RawRow>().enumerate() {
        let row = record.with_context(|| format!("parse csv row {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_jsonl(path: &Path) -> Result<Vec<RawRow>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let row: RawRow = serde_json::from_str(&line)
            .with_context(|| format!("parse row json at line {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Drop rows with an empty question or answer, then later duplicates of a
/// question. Ids come from the source row position, so gaps are expected.
pub fn clean_rows(rows: Vec<RawRow>) -> (Vec<QaEntry>, IngestReport) {
    let mut report = IngestReport {
        rows: rows.len(),
        ..IngestReport::default()
    };
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(rows.len());

    for (row, raw) in rows.into_iter().enumerate() {
        let (question, answer) = match (raw.question, raw.answer) {
            (Some(q), Some(a)) if !q.trim().is_empty() && !a.trim().is_empty() => (q, a),
            _ => {
                report.dropped_empty += 1;
                continue;
            }
        };
        if !seen.insert(question.clone()) {
            report.dropped_duplicate += 1;
            continue;
        }
        entries.push(QaEntry {
            id: format!("q{row:03}"),
            normalized_question: fold_for_embedding(&question),
            question,
            answer,
        });
    }

    if report.dropped_empty > 0 {
        warn!(count = report.dropped_empty, "dropped empty rows");
    }
    if report.dropped_duplicate > 0 {
        warn!(count = report.dropped_duplicate, "dropped duplicate questions");
    }
    report.kept = entries.len();
    info!(kept = report.kept, rows = report.rows, "knowledge base rows ready");
    (entries, report)
}

/// Embed every normalized question, in knowledge base order.
pub fn build_index(
    embedder: &dyn EmbeddingProvider,
    entries: &[QaEntry],
) -> Result<Vec<IndexRecord>> {
    let records = entries
        .par_iter()
        .map(|entry| -> Result<IndexRecord> {
            let vector = embedder
                .embed(&entry.normalized_question)
                .with_context(|| format!("embed question {}", entry.id))?;
            Ok(IndexRecord {
                id: entry.id.clone(),
                vector,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(first) = records.first() {
        let dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
            bail!(
                "embedder returned dimension {} for {}, expected {dim}",
                bad.vector.len(),
                bad.id
            );
        }
    }
    info!(rows = records.len(), "built index");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use tempfile::tempdir;

    fn row(q: &str, a: &str) -> RawRow {
        RawRow {
            question: Some(q.to_string()),
            answer: Some(a.to_string()),
        }
    }

    #[test]
    fn clean_drops_empty_and_duplicate_rows_and_keeps_row_ids() {
        let rows = vec![
            row("Where is my order?", "Check the tracking page."),
            row("", "orphan answer"),
            RawRow {
                question: Some("No answer".to_string()),
                answer: None,
            },
            row("Where is my order?", "Duplicate."),
            row("  How   do I PAY? ", "By card."),
        ];

        let (entries, report) = clean_rows(rows);
        assert_eq!(
            report,
            IngestReport {
                rows: 5,
                kept: 2,
                dropped_empty: 2,
                dropped_duplicate: 1
            }
        );
        assert_eq!(entries[0].id, "q000");
        assert_eq!(entries[0].answer, "Check the tracking page.");
        assert_eq!(entries[1].id, "q004");
        assert_eq!(entries[1].normalized_question, "how do i pay?");
    }

    #[test]
    fn reads_csv_with_quoted_cells() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("faq.csv");
        std::fs::write(
            &path,
            "question,answer\n\"Как оплатить, картой?\",\"Да, картой.\"\n,пусто\n",
        )
        .expect("write");

        let rows = read_rows(&path).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row("Как оплатить, картой?", "Да, картой."));
        assert_eq!(rows[1].question.as_deref().unwrap_or(""), "");
    }

    #[test]
    fn csv_without_required_columns_fails() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("faq.csv");
        std::fs::write(&path, "q,a\nx,y\n").expect("write");
        let err = read_rows(&path).expect_err("missing column");
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn reads_jsonl_and_rejects_unknown_formats() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("faq.jsonl");
        std::fs::write(
            &path,
            "{\"question\":\"a\",\"answer\":\"b\",\"extra\":1}\n\n{\"question\":\"c\"}\n",
        )
        .expect("write");
        let rows = read_rows(&path).expect("rows");
        assert_eq!(
            rows,
            vec![
                row("a", "b"),
                RawRow {
                    question: Some("c".into()),
                    answer: None
                }
            ]
        );

        assert!(read_rows(&dir.path().join("faq.xlsx")).is_err());
    }

    #[test]
    fn index_follows_entry_order() {
        let (entries, _) = clean_rows(vec![row("a b", "1"), row("c d", "2"), row("e f", "3")]);
        let records = build_index(&HashEmbeddingProvider::new(16), &entries).expect("index");
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["q000", "q001", "q002"]);
        assert!(records.iter().all(|r| r.vector.len() == 16));
    }
}
