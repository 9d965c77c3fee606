use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Route;
use crate::service::FaqService;

/// A labelled message. `expected_source` and `min_confidence` are optional
/// extra checks on top of the route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub message: String,
    pub expected_route: Route,
    #[serde(default)]
    pub expected_source: Option<String>,
    #[serde(default)]
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_route: Route,
    pub actual_source: Option<String>,
    pub confidence: f32,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

impl EvalSummary {
    pub fn meets(&self, required_pass_rate: f32) -> bool {
        self.pass_rate >= required_pass_rate
    }
}

pub struct CaseExpectation;

impl CaseExpectation {
    pub fn matches(
        case: &EvalCase,
        actual_route: Route,
        actual_source: Option<&str>,
        confidence: f32,
    ) -> bool {
        if case.expected_route != actual_route {
            return false;
        }

        if let Some(expected) = case.expected_source.as_deref() {
            if actual_source != Some(expected) {
                return false;
            }
        }

        if let Some(min_confidence) = case.min_confidence {
            if confidence < min_confidence {
                return false;
            }
        }

        true
    }
}

pub fn load_cases(path: &Path) -> anyhow::Result<Vec<EvalCase>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut cases = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let case: EvalCase = serde_json::from_str(&line)
            .with_context(|| format!("parse eval case at line {}", idx + 1))?;
        cases.push(case);
    }

    Ok(cases)
}

/// Run every case through the full service path, sequentially.
pub async fn evaluate_cases(service: &FaqService, cases: &[EvalCase]) -> EvalSummary {
    let started_at = Utc::now();
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let answer = service.answer(&case.message).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let passed = CaseExpectation::matches(
            case,
            answer.route,
            answer.response.source.as_deref(),
            answer.response.confidence,
        );
        if !passed {
            tracing::debug!(case = %case.case_id, route = ?answer.route, "eval case failed");
        }

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed,
            actual_route: answer.route,
            actual_source: answer.response.source,
            confidence: answer.response.confidence,
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    EvalSummary {
        started_at,
        finished_at: Utc::now(),
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    }
}
