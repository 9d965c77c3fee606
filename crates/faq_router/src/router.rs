//! Confidence tiers over ranked search hits.

use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::error::QueryError;
use crate::model::{Answer, Route, RoutedResponse, SearchHit, Tier};

pub const GREETING_SOURCE: &str = "greeting";
pub const MAX_SIMILAR_QUESTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct AnswerRouter {
    config: RouterConfig,
}

impl AnswerRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// `None` means there were no hits at all.
    pub fn classify_tier(&self, best: Option<f32>) -> Tier {
        match best {
            Some(score) if score >= self.config.high_threshold => Tier::High,
            Some(score) if score >= self.config.medium_threshold => Tier::Medium,
            _ => Tier::Low,
        }
    }

    pub fn greeting(&self) -> Answer {
        Answer {
            route: Route::Greeting,
            response: RoutedResponse {
                reply: self.config.greeting_reply.clone(),
                confidence: 1.0,
                source: Some(GREETING_SOURCE.to_string()),
                similar_questions: Vec::new(),
            },
        }
    }

    pub fn degraded(&self) -> Answer {
        Answer {
            route: Route::Degraded,
            response: RoutedResponse {
                reply: self.config.error_reply.clone(),
                confidence: 0.0,
                source: None,
                similar_questions: Vec::new(),
            },
        }
    }

    /// Turn a search result into the final answer. Errors never escape: they
    /// become the degraded reply.
    pub fn route(&self, result: Result<Vec<SearchHit>, QueryError>) -> Answer {
        let hits = match result {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "query degraded");
                return self.degraded();
            }
        };

        let best = hits.first();
        let tier = self.classify_tier(best.map(|hit| hit.score));
        let confidence = best.map(|hit| clamp_confidence(hit.score)).unwrap_or(0.0);
        debug!(?tier, confidence, hits = hits.len(), "routed query");

        let response = match (tier, best) {
            (Tier::High, Some(hit)) => RoutedResponse {
                reply: hit.entry.answer.clone(),
                confidence,
                source: Some(hit.entry.id.clone()),
                similar_questions: Vec::new(),
            },
            (Tier::Medium, _) => RoutedResponse {
                reply: self.config.clarify_reply.clone(),
                confidence,
                source: None,
                similar_questions: hits
                    .iter()
                    .take(MAX_SIMILAR_QUESTIONS)
                    .map(|hit| hit.entry.question.clone())
                    .collect(),
            },
            _ => RoutedResponse {
                reply: self.config.escalate_reply.clone(),
                confidence,
                source: None,
                similar_questions: Vec::new(),
            },
        };

        Answer {
            route: tier.into(),
            response,
        }
    }
}

fn clamp_confidence(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
