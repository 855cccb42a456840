//! Scenario Builder: turns setup-form input into an immutable `Scenario`,
//! gated on the user's usage credit.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::errors::AppError;
use crate::interview::models::{InputMode, Scenario};
use crate::store::usage::UsageCredits;

pub const DEFAULT_INDUSTRY: &str = "technology";
pub const DEFAULT_EXPERIENCE: &str = "mid-level";
pub const DEFAULT_LANGUAGE: &str = "english";
pub const DEFAULT_PERSONA: &str = "Friendly & Casual";

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("no scenario parameters supplied")]
    Empty,

    #[error("'{0}' is required")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidMode(String),
}

impl From<ScenarioError> for AppError {
    fn from(e: ScenarioError) -> Self {
        match e {
            ScenarioError::Empty => AppError::NoScenario,
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Raw setup-form input. Optional fields take the form's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioForm {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub company: String,
    pub industry: Option<String>,
    pub experience: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    pub mode: Option<String>,
}

impl ScenarioForm {
    pub fn build(self) -> Result<Scenario, ScenarioError> {
        let role = required(self.role, "role")?;
        let company = required(self.company, "company")?;
        let input_mode = match non_blank(self.mode) {
            Some(mode) => mode.parse::<InputMode>().map_err(ScenarioError::InvalidMode)?,
            None => InputMode::default(),
        };

        Ok(Scenario {
            role,
            company,
            industry: non_blank(self.industry).unwrap_or_else(|| DEFAULT_INDUSTRY.to_string()),
            experience_level: non_blank(self.experience)
                .unwrap_or_else(|| DEFAULT_EXPERIENCE.to_string()),
            persona: non_blank(self.persona).unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            language: non_blank(self.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            input_mode,
        })
    }
}

impl Scenario {
    /// Rebuilds a scenario from session entry parameters. An empty map means
    /// no scenario was chosen and the caller belongs back on the setup screen.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Scenario, ScenarioError> {
        if params.is_empty() {
            return Err(ScenarioError::Empty);
        }
        let get = |key: &str| params.get(key).cloned();
        ScenarioForm {
            role: get("role").unwrap_or_default(),
            company: get("company").unwrap_or_default(),
            industry: get("industry"),
            experience: get("experience"),
            persona: get("persona"),
            language: get("language"),
            mode: get("mode"),
        }
        .build()
    }
}

#[derive(Debug, Serialize)]
pub struct SubmittedScenario {
    pub scenario: Scenario,
    /// Session entry parameters for `POST /api/v1/sessions`.
    pub params: BTreeMap<String, String>,
    pub remaining_credits: u32,
}

/// Validates the form, then spends one credit.
///
/// The credit check and the decrement are two separate store operations, so
/// two concurrent submissions for the same user can both pass the check.
pub async fn submit(
    credits: &UsageCredits,
    user_id: &str,
    form: ScenarioForm,
) -> Result<SubmittedScenario, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    let scenario = form.build()?;

    let available = credits.get(user_id).await?;
    if available == 0 {
        info!("User {user_id} has no interview credits left");
        return Err(AppError::OutOfCredits);
    }
    let remaining_credits = credits.decrement(user_id).await?;
    info!(
        "Scenario accepted for user {user_id}: {} at {} ({} credits left)",
        scenario.role, scenario.company, remaining_credits
    );

    Ok(SubmittedScenario {
        params: scenario.to_params(),
        scenario,
        remaining_credits,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: String, field: &'static str) -> Result<String, ScenarioError> {
    non_blank(Some(value)).ok_or(ScenarioError::MissingField(field))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;

    fn form() -> ScenarioForm {
        ScenarioForm {
            role: "Software Engineer".to_string(),
            company: "Acme".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_applies_form_defaults() {
        let scenario = form().build().unwrap();
        assert_eq!(scenario.industry, DEFAULT_INDUSTRY);
        assert_eq!(scenario.experience_level, DEFAULT_EXPERIENCE);
        assert_eq!(scenario.language, DEFAULT_LANGUAGE);
        assert_eq!(scenario.persona, DEFAULT_PERSONA);
        assert_eq!(scenario.input_mode, InputMode::Voice);
    }

    #[test]
    fn test_build_requires_role_and_company() {
        let mut f = form();
        f.company = "   ".to_string();
        assert_eq!(f.build(), Err(ScenarioError::MissingField("company")));
    }

    #[test]
    fn test_build_rejects_unknown_mode() {
        let mut f = form();
        f.mode = Some("telepathy".to_string());
        assert!(matches!(f.build(), Err(ScenarioError::InvalidMode(_))));
    }

    #[test]
    fn test_from_params_empty_map_is_no_scenario() {
        assert_eq!(
            Scenario::from_params(&HashMap::new()),
            Err(ScenarioError::Empty)
        );
    }

    #[test]
    fn test_params_roundtrip_through_session_entry() {
        let mut f = form();
        f.mode = Some("text".to_string());
        f.language = Some("ja".to_string());
        let scenario = f.build().unwrap();
        let params: HashMap<String, String> = scenario.to_params().into_iter().collect();
        assert_eq!(Scenario::from_params(&params).unwrap(), scenario);
    }

    #[tokio::test]
    async fn test_submit_spends_one_credit() {
        let credits = UsageCredits::new(Arc::new(MemoryStore::default()), 3);
        let submitted = submit(&credits, "user-1", form()).await.unwrap();
        assert_eq!(submitted.remaining_credits, 2);
        assert_eq!(credits.get("user-1").await.unwrap(), 2);
        assert_eq!(submitted.params.get("role").map(String::as_str), Some("Software Engineer"));
    }

    #[tokio::test]
    async fn test_submit_blocked_at_zero_credits() {
        let credits = UsageCredits::new(Arc::new(MemoryStore::default()), 1);
        submit(&credits, "user-1", form()).await.unwrap();
        let blocked = submit(&credits, "user-1", form()).await;
        assert!(matches!(blocked, Err(AppError::OutOfCredits)));
        assert_eq!(credits.get("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_form_does_not_spend_credit() {
        let credits = UsageCredits::new(Arc::new(MemoryStore::default()), 3);
        let mut f = form();
        f.role = String::new();
        assert!(matches!(
            submit(&credits, "user-1", f).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(credits.get("user-1").await.unwrap(), 3);
    }
}
