//! Remote Analysis Gateway: every call to an external text, speech or LLM
//! service goes through the `AnalysisGateway` trait.
//!
//! Each operation is one request/response round trip bounded by a deadline.
//! Callers own the fallback: a failed call is a typed `GatewayError`, never a panic.

pub mod models;
pub mod prompts;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::gateway::models::{
    CompetencyAssessment, FeedbackRequest, PersonaRequest, PersonaResponse, ScoreRequest,
    StarAssessment,
};
use crate::gateway::prompts::{COMPETENCY_PROMPT, FEEDBACK_PROMPT, PERSONA_PROMPT, STAR_PROMPT};
use crate::llm_client::prompts::{fill, language_instruction, COACH_SYSTEM, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::speech::{AudioPayload, SpeechClient, SpeechError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("remote call exceeded {0:?}")]
    Timeout(Duration),

    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error("remote returned unusable output: {0}")]
    InvalidOutput(String),
}

impl From<LlmError> for GatewayError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Parse(e) => GatewayError::InvalidOutput(e.to_string()),
            LlmError::EmptyContent => GatewayError::InvalidOutput(e.to_string()),
            other => GatewayError::Remote(other.to_string()),
        }
    }
}

impl From<SpeechError> for GatewayError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::InvalidDataUri(_) | SpeechError::NoTranscript => {
                GatewayError::InvalidOutput(e.to_string())
            }
            other => GatewayError::Remote(other.to_string()),
        }
    }
}

/// The gateway trait. The session orchestrator and the assessment aggregator
/// hold an `Arc<dyn AnalysisGateway>`, so tests swap in a scripted fake.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn generate_persona(&self, request: &PersonaRequest) -> Result<String, GatewayError>;

    /// `audio_data_uri` is `data:audio/<type>;base64,<payload>`.
    async fn transcribe_audio(&self, audio_data_uri: &str) -> Result<String, GatewayError>;

    /// Returns a data URI, or `None` when the provider produced no audio.
    async fn synthesize_speech(&self, text: &str) -> Result<Option<String>, GatewayError>;

    async fn score_response(
        &self,
        request: &ScoreRequest,
    ) -> Result<CompetencyAssessment, GatewayError>;

    async fn score_star(&self, request: &ScoreRequest) -> Result<StarAssessment, GatewayError>;

    async fn provide_feedback(&self, request: &FeedbackRequest) -> Result<String, GatewayError>;
}

/// Production gateway: Claude for text, Deepgram for speech.
pub struct RemoteGateway {
    llm: LlmClient,
    speech: Option<SpeechClient>,
    deadline: Duration,
}

impl RemoteGateway {
    pub fn new(llm: LlmClient, speech: Option<SpeechClient>, deadline: Duration) -> Self {
        Self {
            llm,
            speech,
            deadline,
        }
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{operation} failed: {e}");
                Err(e)
            }
            Err(_) => {
                warn!("{operation} timed out after {:?}", self.deadline);
                Err(GatewayError::Timeout(self.deadline))
            }
        }
    }

    fn speech(&self) -> Result<&SpeechClient, GatewayError> {
        self.speech
            .as_ref()
            .ok_or(GatewayError::Unavailable("speech provider"))
    }
}

#[async_trait]
impl AnalysisGateway for RemoteGateway {
    async fn generate_persona(&self, request: &PersonaRequest) -> Result<String, GatewayError> {
        let prompt = fill(
            PERSONA_PROMPT,
            &[
                ("company", request.company.as_str()),
                ("role", request.role.as_str()),
                ("industry", request.industry.as_str()),
            ],
        );
        self.bounded("generate_persona", async {
            let persona: PersonaResponse = self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
            Ok(persona.persona_description)
        })
        .await
    }

    async fn transcribe_audio(&self, audio_data_uri: &str) -> Result<String, GatewayError> {
        let speech = self.speech()?;
        let audio = AudioPayload::from_data_uri(audio_data_uri)?;
        self.bounded("transcribe_audio", async {
            Ok(speech.transcribe(&audio).await?)
        })
        .await
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Option<String>, GatewayError> {
        let speech = self.speech()?;
        self.bounded("synthesize_speech", async {
            let audio = speech.synthesize(text).await?;
            Ok(audio.map(|a| a.to_data_uri()))
        })
        .await
    }

    async fn score_response(
        &self,
        request: &ScoreRequest,
    ) -> Result<CompetencyAssessment, GatewayError> {
        let prompt = scoring_prompt(COMPETENCY_PROMPT, request);
        self.bounded("score_response", async {
            let assessment: CompetencyAssessment =
                self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
            assessment.validate().map_err(GatewayError::InvalidOutput)?;
            Ok(assessment)
        })
        .await
    }

    async fn score_star(&self, request: &ScoreRequest) -> Result<StarAssessment, GatewayError> {
        let prompt = scoring_prompt(STAR_PROMPT, request);
        self.bounded("score_star", async {
            Ok(self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?)
        })
        .await
    }

    async fn provide_feedback(&self, request: &FeedbackRequest) -> Result<String, GatewayError> {
        let language = language_instruction(&request.language);
        let prompt = fill(
            FEEDBACK_PROMPT,
            &[
                ("persona", request.persona.as_str()),
                ("job_description", request.job_description.as_str()),
                ("question", request.question.as_str()),
                ("answer", request.answer.as_str()),
                ("language_instruction", language.as_str()),
            ],
        );
        self.bounded("provide_feedback", async {
            Ok(self.llm.call_text(&prompt, COACH_SYSTEM).await?)
        })
        .await
    }
}

fn scoring_prompt(template: &str, request: &ScoreRequest) -> String {
    let language = language_instruction(&request.language);
    fill(
        template,
        &[
            ("role", request.role.as_str()),
            ("industry", request.industry.as_str()),
            ("question", request.question.as_str()),
            ("answer", request.answer.as_str()),
            ("language_instruction", language.as_str()),
        ],
    )
}
