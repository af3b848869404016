pub mod gemini;
pub mod json;

use crate::domain::recommendation::Recommendation;

#[derive(Debug, Clone)]
pub struct EngineInput {
    pub news_summary: String,
    pub risk_appetite: String,
    /// The merged market dataset, serialized to a JSON string for the prompt.
    pub market_data_json: String,
    pub comprehensive: bool,
}

/// Outcome of a generation call that produced parseable output. A reply that
/// explicitly carries an error field is distinct from "no recommendation
/// available" (the engine returning `None`).
#[derive(Debug, Clone)]
pub enum EngineReply {
    Advice(Recommendation),
    Rejected { error: String },
}

#[async_trait::async_trait]
pub trait RecommendationEngine: Send + Sync {
    /// `None` means the call failed (transport, HTTP, or unparseable output);
    /// the failure has already been logged.
    async fn recommend(&self, input: &EngineInput) -> Option<EngineReply>;
}
