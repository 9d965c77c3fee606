use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::InitError;
use crate::index::FlatIndex;
use crate::knowledge::KnowledgeBase;
use crate::model::QaEntry;

/// One line of the index file. Rows follow knowledge base order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
}

pub fn save_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let line = serde_json::to_string(record).context("serialize record")?;
        writer
            .write_all(line.as_bytes())
            .context("write record line")?;
        writer.write_all(b"\n").context("write newline")?;
    }

    writer.flush().context("flush output")
}

pub fn save_knowledge_base(path: &Path, entries: &[QaEntry]) -> Result<()> {
    save_jsonl(path, entries)
}

pub fn save_index(path: &Path, records: &[IndexRecord]) -> Result<()> {
    save_jsonl(path, records)
}

/// Read a JSONL file, skipping blank lines. Line numbers in errors are 1-based.
fn load_jsonl<T: DeserializeOwned>(
    path: &Path,
    kind: &'static str,
) -> Result<Vec<(usize, T)>, InitError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => InitError::Missing {
            kind,
            path: path.to_path_buf(),
        },
        _ => InitError::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    })?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| InitError::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|err| InitError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            message: err.to_string(),
        })?;
        records.push((idx + 1, record));
    }
    Ok(records)
}

pub fn load_knowledge_base(path: &Path) -> Result<KnowledgeBase, InitError> {
    let records: Vec<(usize, QaEntry)> = load_jsonl(path, "knowledge base")?;

    // Duplicate ids are reported against file lines, not record positions.
    let mut seen = HashSet::with_capacity(records.len());
    for (line, entry) in &records {
        if !seen.insert(entry.id.as_str()) {
            return Err(InitError::DuplicateId {
                id: entry.id.clone(),
                line: *line,
            });
        }
    }

    let kb = KnowledgeBase::new(records.into_iter().map(|(_, entry)| entry).collect())?;
    tracing::info!(path = %path.display(), entries = kb.len(), "loaded knowledge base");
    Ok(kb)
}

/// Load the index file and check it row by row against `knowledge`.
pub fn load_index(
    path: &Path,
    knowledge: &KnowledgeBase,
    dim: usize,
) -> Result<FlatIndex, InitError> {
    let records: Vec<(usize, IndexRecord)> = load_jsonl(path, "index")?;

    if records.len() != knowledge.len() {
        return Err(InitError::IndexMismatch(format!(
            "index has {} rows, knowledge base has {} entries",
            records.len(),
            knowledge.len()
        )));
    }

    let mut rows = Vec::with_capacity(records.len());
    for (row, (line, record)) in records.into_iter().enumerate() {
        let expected = knowledge.get(row).map(|e| e.id.as_str()).unwrap_or_default();
        if record.id != expected {
            return Err(InitError::IndexMismatch(format!(
                "line {line}: index id '{}' does not match knowledge base id '{expected}'",
                record.id
            )));
        }
        if record.vector.len() != dim {
            return Err(InitError::IndexMismatch(format!(
                "line {line}: vector has dimension {}, expected {dim}",
                record.vector.len()
            )));
        }
        rows.push(record.vector);
    }

    let index = FlatIndex::new(dim, rows)?;
    tracing::info!(path = %path.display(), rows = knowledge.len(), dim, "loaded index");
    Ok(index)
}
