use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Voice,
    Text,
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voice" => Ok(InputMode::Voice),
            "text" => Ok(InputMode::Text),
            other => Err(format!("mode must be 'voice' or 'text' (got '{other}')")),
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputMode::Voice => "voice",
            InputMode::Text => "text",
        })
    }
}

/// Interview configuration chosen before a session starts. Never mutated afterwards.
///
/// Serialized with the same flat keys the setup form submits, so a stored
/// handoff record and the session entry parameters agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub role: String,
    pub company: String,
    pub industry: String,
    #[serde(rename = "experience")]
    pub experience_level: String,
    pub persona: String,
    pub language: String,
    #[serde(rename = "mode")]
    pub input_mode: InputMode,
}

impl Scenario {
    /// The job description handed to the feedback prompt.
    pub fn job_description(&self) -> String {
        format!(
            "Role: {}, Company: {}, Industry: {}",
            self.role, self.company, self.industry
        )
    }

    /// Flat string map used as session entry parameters.
    pub fn to_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("role".to_string(), self.role.clone()),
            ("company".to_string(), self.company.clone()),
            ("industry".to_string(), self.industry.clone()),
            ("experience".to_string(), self.experience_level.clone()),
            ("persona".to_string(), self.persona.clone()),
            ("language".to_string(), self.language.clone()),
            ("mode".to_string(), self.input_mode.to_string()),
        ])
    }
}

/// One question and the candidate's eventual answer (empty until answered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QAPair {
    pub question: String,
    pub answer: String,
}

impl QAPair {
    pub fn is_answered(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    User,
}

/// Display log line. Append-only; not used for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// The handoff record written once when a session finishes and read once by
/// the assessment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewData {
    /// Answered pairs only, in question order.
    pub transcript: Vec<QAPair>,
    pub scenario: Scenario,
}

#[cfg(test)]
pub(crate) fn sample_scenario(mode: InputMode) -> Scenario {
    Scenario {
        role: "Software Engineer".to_string(),
        company: "Acme".to_string(),
        industry: "technology".to_string(),
        experience_level: "mid-level".to_string(),
        persona: "Friendly & Casual".to_string(),
        language: "english".to_string(),
        input_mode: mode,
    }
}
