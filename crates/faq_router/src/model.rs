use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub normalized_question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entry: QaEntry,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Medium,
    Low,
}

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Greeting,
    High,
    Medium,
    Low,
    Degraded,
}

impl From<Tier> for Route {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::High => Route::High,
            Tier::Medium => Route::Medium,
            Tier::Low => Route::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub reply: String,
    pub confidence: f32,
    pub source: Option<String>,
    pub similar_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub route: Route,
    pub response: RoutedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Uninitialized,
    Ready,
    Failed,
}
