//! Assessment Aggregator: one scoring request per answered question, all in
//! flight at once, re-assembled in question order.
//!
//! A failed request costs only its own entry (plus a warning). The run fails
//! as a whole only when every request fails.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::models::{CompetencyAssessment, ScoreRequest, StarAssessment};
use crate::gateway::{AnalysisGateway, GatewayError};
use crate::interview::models::{InterviewData, Scenario};
use crate::interview::questions::prompt_language;

/// How much of a question the failure warning quotes.
const WARNING_QUOTE_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStyle {
    #[default]
    Competency,
    Star,
}

impl FromStr for AssessmentStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "competency" => Ok(AssessmentStyle::Competency),
            "star" => Ok(AssessmentStyle::Star),
            other => anyhow::bail!("ASSESSMENT_STYLE must be competency or star (got '{other}')"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum AssessmentDetail {
    Competency(CompetencyAssessment),
    Star(StarAssessment),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub question: String,
    pub answer: String,
    pub detail: AssessmentDetail,
}

/// A question whose scoring request failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisWarning {
    pub question_index: usize,
    pub question: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub scenario: Scenario,
    pub style: AssessmentStyle,
    /// Transcript order, failed questions omitted.
    pub entries: Vec<ReportEntry>,
    pub warnings: Vec<AnalysisWarning>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum AggregateOutcome {
    Report(AssessmentReport),
    /// Nothing could be scored. Distinct from an empty report.
    AnalysisFailed { warnings: Vec<AnalysisWarning> },
}

pub fn warning_message(question: &str) -> String {
    let quoted: String = question.chars().take(WARNING_QUOTE_CHARS).collect();
    format!("Could not analyze the answer for: \"{quoted}...\"")
}

async fn score_one(
    gateway: &dyn AnalysisGateway,
    request: ScoreRequest,
    style: AssessmentStyle,
) -> Result<AssessmentDetail, GatewayError> {
    match style {
        AssessmentStyle::Competency => gateway
            .score_response(&request)
            .await
            .map(AssessmentDetail::Competency),
        AssessmentStyle::Star => gateway.score_star(&request).await.map(AssessmentDetail::Star),
    }
}

/// Scores every pair in `data` concurrently. No retries.
pub async fn aggregate(
    gateway: &dyn AnalysisGateway,
    data: &InterviewData,
    style: AssessmentStyle,
) -> AggregateOutcome {
    let scenario = &data.scenario;
    let language = prompt_language(&scenario.language);

    let requests = data.transcript.iter().map(|pair| {
        let request = ScoreRequest {
            question: pair.question.clone(),
            answer: pair.answer.clone(),
            role: scenario.role.clone(),
            industry: scenario.industry.clone(),
            language: language.clone(),
        };
        score_one(gateway, request, style)
    });

    // join_all yields results in input order, whatever order they complete in.
    let results = join_all(requests).await;

    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for (index, (pair, result)) in data.transcript.iter().zip(results).enumerate() {
        match result {
            Ok(detail) => entries.push(ReportEntry {
                question: pair.question.clone(),
                answer: pair.answer.clone(),
                detail,
            }),
            Err(e) => {
                warn!("Failed to analyze answer {}: {e}", index + 1);
                warnings.push(AnalysisWarning {
                    question_index: index,
                    question: pair.question.clone(),
                    message: warning_message(&pair.question),
                });
            }
        }
    }

    if entries.is_empty() {
        warn!(
            "Assessment failed: none of {} answers could be analyzed",
            data.transcript.len()
        );
        return AggregateOutcome::AnalysisFailed { warnings };
    }

    info!(
        "Assessment built: {} scored, {} failed",
        entries.len(),
        warnings.len()
    );
    AggregateOutcome::Report(AssessmentReport {
        scenario: scenario.clone(),
        style,
        entries,
        warnings,
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::fake::{assessment, FakeGateway, Scripted};
    use crate::interview::models::{sample_scenario, InputMode, QAPair};

    fn data(questions: &[&str]) -> InterviewData {
        InterviewData {
            transcript: questions
                .iter()
                .map(|q| QAPair {
                    question: q.to_string(),
                    answer: format!("Answer to {q}"),
                })
                .collect(),
            scenario: sample_scenario(InputMode::Text),
        }
    }

    fn report(outcome: AggregateOutcome) -> AssessmentReport {
        match outcome {
            AggregateOutcome::Report(report) => report,
            AggregateOutcome::AnalysisFailed { .. } => panic!("expected a report"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_keeps_transcript_order_and_drops_failures() {
        let gateway = FakeGateway::default();
        gateway.set_score(
            "Question one",
            Scripted::ok(assessment("Leadership", 4)).after(Duration::from_millis(300)),
        );
        gateway.set_score(
            "Question two",
            Scripted::ok(assessment("Teamwork", 3)).after(Duration::from_millis(10)),
        );
        gateway.set_score(
            "Question three",
            Scripted::err("model overloaded").after(Duration::from_millis(50)),
        );

        let outcome = aggregate(
            &gateway,
            &data(&["Question one", "Question two", "Question three"]),
            AssessmentStyle::Competency,
        )
        .await;
        let report = report(outcome);

        let questions: Vec<_> = report.entries.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, ["Question one", "Question two"]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].question_index, 2);
        assert_eq!(
            report.warnings[0].message,
            "Could not analyze the answer for: \"Question three...\""
        );
    }

    #[tokio::test]
    async fn test_requests_carry_scenario_fields() {
        let gateway = FakeGateway::default();
        gateway.set_score("Q", Scripted::ok(assessment("Ownership", 5)));
        let mut input = data(&["Q"]);
        input.scenario.language = String::new();

        report(aggregate(&gateway, &input, AssessmentStyle::Competency).await);

        let requests = gateway.score_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].role, "Software Engineer");
        assert_eq!(requests[0].industry, "technology");
        assert_eq!(requests[0].answer, "Answer to Q");
        assert_eq!(requests[0].language, "English");
    }

    #[tokio::test]
    async fn test_all_failures_is_analysis_failed() {
        let gateway = FakeGateway::default();
        let outcome = aggregate(&gateway, &data(&["A", "B"]), AssessmentStyle::Competency).await;
        match outcome {
            AggregateOutcome::AnalysisFailed { warnings } => assert_eq!(warnings.len(), 2),
            AggregateOutcome::Report(_) => panic!("expected analysis failure"),
        }
    }

    #[tokio::test]
    async fn test_star_style() {
        let gateway = FakeGateway::default();
        gateway.set_score("Q", Scripted::ok(assessment("Delivery", 2)));
        let report = report(aggregate(&gateway, &data(&["Q"]), AssessmentStyle::Star).await);
        assert!(matches!(report.entries[0].detail, AssessmentDetail::Star(_)));
    }

    #[test]
    fn test_warning_quote_is_char_safe() {
        let question = "これまでに携わった中で最も技術的に難しかったプロジェクトについて教えてください。";
        let message = warning_message(question);
        assert!(message.ends_with("...\""));
        assert!(message.contains("これまでに"));
    }

    #[test]
    fn test_style_parse() {
        assert_eq!("STAR".parse::<AssessmentStyle>().unwrap(), AssessmentStyle::Star);
        assert!("holistic".parse::<AssessmentStyle>().is_err());
    }
}
