use serde::{Deserialize, Serialize};

/// Inputs for interviewer persona generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaRequest {
    pub company: String,
    pub role: String,
    pub industry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub persona_description: String,
}

/// Inputs for the in-session coaching reply to one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub answer: String,
    pub question: String,
    pub persona: String,
    pub job_description: String,
    pub language: String,
}

/// Inputs for scoring one answered question after the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub question: String,
    pub answer: String,
    pub role: String,
    pub industry: String,
    pub language: String,
}

/// Competency-style score for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyAssessment {
    pub competency: String,
    pub assessment: String,
    /// 1 (poor) ..= 5 (excellent)
    pub score: u8,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarBreakdown {
    pub situation: String,
    pub task: String,
    pub action: String,
    pub result: String,
}

/// STAR-style (situation/task/action/result) review of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarAssessment {
    pub overall_feedback: String,
    pub star_assessment: StarBreakdown,
    pub suggestions: Vec<String>,
}

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

impl CompetencyAssessment {
    /// Rejects output the model was told not to produce.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            return Err(format!(
                "score {} outside {MIN_SCORE}..={MAX_SCORE}",
                self.score
            ));
        }
        if self.competency.trim().is_empty() {
            return Err("competency is empty".to_string());
        }
        Ok(())
    }
}
