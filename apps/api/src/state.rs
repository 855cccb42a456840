use std::sync::Arc;

use crate::assessment::aggregator::AssessmentStyle;
use crate::gateway::AnalysisGateway;
use crate::interview::machine::SessionPolicy;
use crate::interview::orchestrator::SessionRegistry;
use crate::store::usage::UsageCredits;
use crate::store::KeyValueStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Remote text/speech/LLM calls. Swapped for a scripted fake in tests.
    pub gateway: Arc<dyn AnalysisGateway>,
    /// Holds usage counters and handoff records.
    pub store: Arc<dyn KeyValueStore>,
    pub credits: UsageCredits,
    pub sessions: SessionRegistry,
    pub policy: SessionPolicy,
    pub assessment_style: AssessmentStyle,
}
