//! Session turn-taking state machine.
//!
//! Pure: `transition` takes the current state and one event and returns the
//! next state plus the effects the driver must run. No I/O, no clocks.
//!
//! Per turn: AwaitingPrompt → PresentingPrompt → CapturingResponse →
//! ProcessingResponse → ShowingFeedback → (advance) → next PresentingPrompt,
//! or Finished / Abandoned. Advancing is instantaneous and never observable.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::models::FeedbackRequest;
use crate::interview::models::{
    InputMode, InterviewData, QAPair, Scenario, Speaker, TranscriptEntry,
};
use crate::interview::questions::{prompt_language, question_set, QuestionSet};

/// Shown in place of coach feedback when the feedback call fails.
pub const FEEDBACK_FALLBACK: &str = "Sorry, I couldn't process that. Let's try again.";

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// What a blank transcription means for the current question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyResponsePolicy {
    /// Treat the question as skipped and move on.
    #[default]
    Skip,
    /// Stay on the question and capture again.
    Reprompt,
}

impl FromStr for EmptyResponsePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(EmptyResponsePolicy::Skip),
            "reprompt" => Ok(EmptyResponsePolicy::Reprompt),
            other => anyhow::bail!("EMPTY_RESPONSE_POLICY must be skip or reprompt (got '{other}')"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Feedback display interval. `None` disables auto-advance; the user
    /// must send `NextQuestion`.
    pub auto_advance: Option<Duration>,
    pub empty_response: EmptyResponsePolicy,
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingPrompt,
    PresentingPrompt,
    CapturingResponse,
    ProcessingResponse,
    ShowingFeedback,
    Finished,
    Abandoned,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Abandoned)
    }

    fn as_str(self) -> &'static str {
        match self {
            Phase::AwaitingPrompt => "awaiting_prompt",
            Phase::PresentingPrompt => "presenting_prompt",
            Phase::CapturingResponse => "capturing_response",
            Phase::ProcessingResponse => "processing_response",
            Phase::ShowingFeedback => "showing_feedback",
            Phase::Finished => "finished",
            Phase::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight work. At most one of each at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Busy {
    pub recording: bool,
    pub transcribing: bool,
    pub synthesizing: bool,
    pub scoring: bool,
    pub finishing: bool,
}

impl Busy {
    /// The coarse indicator that blocks recording, text submission and leaving.
    /// Prompt synthesis is fire-and-forget and does not count.
    pub fn processing(&self) -> bool {
        self.transcribing || self.scoring || self.finishing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MicrophoneDenied,
    SpeechFailed,
    TranscriptionFailed,
    EmptyResponse,
    FeedbackFailed,
    NoResponses,
    PersistFailed,
}

/// A dismissible user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    Setup,
    Assessment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub scenario: Scenario,
    pub questions: QuestionSet,
    pub phase: Phase,
    /// Always a valid index into `questions`.
    pub question_index: usize,
    /// One pair per question asked so far; `qa_pairs.len() == question_index + 1`
    /// once the first question is presented.
    pub qa_pairs: Vec<QAPair>,
    pub transcript: Vec<TranscriptEntry>,
    pub feedback: Option<String>,
    pub input_mode: InputMode,
    /// False once microphone access has been denied.
    pub voice_available: bool,
    /// Data URI for the current question's spoken prompt.
    pub prompt_audio: Option<String>,
    pub busy: Busy,
    pub notices: Vec<Notice>,
    pub redirect: Option<Redirect>,
}

impl SessionState {
    pub fn current_question(&self) -> Option<&'static str> {
        self.questions.get(self.question_index)
    }

    pub fn answered_pairs(&self) -> Vec<QAPair> {
        self.qa_pairs
            .iter()
            .filter(|pair| pair.is_answered())
            .cloned()
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events and effects
// ────────────────────────────────────────────────────────────────────────────

/// Everything that can happen to a session. Remote-call results carry the
/// `turn` (question index) they were issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PromptAudioReady { turn: usize, audio: Option<String> },
    PromptAudioFailed { turn: usize, reason: String },
    PromptPlaybackFinished,
    MicrophoneDenied,
    SetInputMode { mode: InputMode },
    StartRecording,
    StopRecording { audio: String },
    TranscriptionCompleted { turn: usize, text: String },
    TranscriptionFailed { turn: usize, reason: String },
    SubmitText { text: String },
    FeedbackReceived { turn: usize, feedback: String },
    FeedbackFailed { turn: usize, reason: String },
    AutoAdvance { turn: usize },
    NextQuestion,
    Finish,
    PersistSucceeded,
    PersistFailed { reason: String },
    DismissNotices,
    Teardown,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PromptAudioReady { .. } => "prompt_audio_ready",
            Event::PromptAudioFailed { .. } => "prompt_audio_failed",
            Event::PromptPlaybackFinished => "prompt_playback_finished",
            Event::MicrophoneDenied => "microphone_denied",
            Event::SetInputMode { .. } => "set_input_mode",
            Event::StartRecording => "start_recording",
            Event::StopRecording { .. } => "stop_recording",
            Event::TranscriptionCompleted { .. } => "transcription_completed",
            Event::TranscriptionFailed { .. } => "transcription_failed",
            Event::SubmitText { .. } => "submit_text",
            Event::FeedbackReceived { .. } => "feedback_received",
            Event::FeedbackFailed { .. } => "feedback_failed",
            Event::AutoAdvance { .. } => "auto_advance",
            Event::NextQuestion => "next_question",
            Event::Finish => "finish",
            Event::PersistSucceeded => "persist_succeeded",
            Event::PersistFailed { .. } => "persist_failed",
            Event::DismissNotices => "dismiss_notices",
            Event::Teardown => "teardown",
        }
    }

    /// Produced by the driver, never by a client.
    fn is_driver_result(&self) -> bool {
        matches!(
            self,
            Event::PromptAudioReady { .. }
                | Event::PromptAudioFailed { .. }
                | Event::TranscriptionCompleted { .. }
                | Event::TranscriptionFailed { .. }
                | Event::FeedbackReceived { .. }
                | Event::FeedbackFailed { .. }
                | Event::AutoAdvance { .. }
                | Event::PersistSucceeded
                | Event::PersistFailed { .. }
        )
    }
}

/// The events a client may send over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    PromptPlaybackFinished,
    MicrophoneDenied,
    SetInputMode { mode: InputMode },
    StartRecording,
    /// `audio` is a `data:audio/...;base64,` URI.
    StopRecording { audio: String },
    SubmitText { text: String },
    NextQuestion,
    Finish,
    DismissNotices,
}

impl From<ClientEvent> for Event {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::PromptPlaybackFinished => Event::PromptPlaybackFinished,
            ClientEvent::MicrophoneDenied => Event::MicrophoneDenied,
            ClientEvent::SetInputMode { mode } => Event::SetInputMode { mode },
            ClientEvent::StartRecording => Event::StartRecording,
            ClientEvent::StopRecording { audio } => Event::StopRecording { audio },
            ClientEvent::SubmitText { text } => Event::SubmitText { text },
            ClientEvent::NextQuestion => Event::NextQuestion,
            ClientEvent::Finish => Event::Finish,
            ClientEvent::DismissNotices => Event::DismissNotices,
        }
    }
}

/// Work the driver performs on behalf of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SynthesizeSpeech { turn: usize, text: String },
    Transcribe { turn: usize, audio: String },
    RequestFeedback { turn: usize, request: FeedbackRequest },
    ScheduleAdvance { turn: usize, after: Duration },
    CancelAdvance,
    PersistHandoff(InterviewData),
    RedirectToSetup,
    HandoffToAssessment,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("another operation is still in progress")]
    Busy,

    #[error("'{event}' is not allowed while the session is {phase}")]
    NotAllowed { event: &'static str, phase: Phase },

    #[error("voice input is unavailable for this session")]
    VoiceUnavailable,

    #[error("the session has ended")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

// ────────────────────────────────────────────────────────────────────────────
// Transition function
// ────────────────────────────────────────────────────────────────────────────

/// Creates a session for `scenario` and presents the first question.
pub fn start(scenario: Scenario) -> Transition {
    let questions = question_set(&scenario.language, &scenario.role);
    let state = SessionState {
        input_mode: scenario.input_mode,
        scenario,
        questions,
        phase: Phase::AwaitingPrompt,
        question_index: 0,
        qa_pairs: Vec::new(),
        transcript: Vec::new(),
        feedback: None,
        voice_available: true,
        prompt_audio: None,
        busy: Busy::default(),
        notices: Vec::new(),
        redirect: None,
    };
    let mut step = Step::new(state);
    step.present_question();
    step.into_transition()
}

/// Applies one event. A rejected event leaves the caller's state untouched.
///
/// Stale remote results (wrong turn, or arriving after the session closed)
/// are accepted and change nothing.
pub fn transition(
    state: &SessionState,
    event: Event,
    policy: &SessionPolicy,
) -> Result<Transition, Rejection> {
    let mut step = Step::new(state.clone());
    step.apply(event, policy)?;
    Ok(step.into_transition())
}

struct Step {
    state: SessionState,
    effects: Vec<Effect>,
}

impl Step {
    fn new(state: SessionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    fn into_transition(self) -> Transition {
        Transition {
            state: self.state,
            effects: self.effects,
        }
    }

    fn not_allowed(&self, event: &Event) -> Rejection {
        Rejection::NotAllowed {
            event: event.name(),
            phase: self.state.phase,
        }
    }

    fn notice(&mut self, kind: NoticeKind, message: &str) {
        self.state.notices.push(Notice {
            kind,
            message: message.to_string(),
        });
    }

    /// True when a remote result no longer belongs to the current turn.
    fn is_stale(&self, turn: usize) -> bool {
        turn != self.state.question_index
    }

    fn apply(&mut self, event: Event, policy: &SessionPolicy) -> Result<(), Rejection> {
        if self.state.phase.is_terminal() {
            return match event {
                Event::Finish | Event::Teardown => Ok(()),
                Event::DismissNotices => {
                    self.state.notices.clear();
                    Ok(())
                }
                e if e.is_driver_result() => Ok(()),
                _ => Err(Rejection::Closed),
            };
        }

        match event {
            Event::PromptAudioReady { turn, audio } => {
                if self.is_stale(turn) || !self.state.busy.synthesizing {
                    return Ok(());
                }
                self.state.busy.synthesizing = false;
                let silent = audio.is_none();
                self.state.prompt_audio = audio;
                if silent {
                    self.begin_voice_capture();
                }
            }

            Event::PromptAudioFailed { turn, .. } => {
                if self.is_stale(turn) || !self.state.busy.synthesizing {
                    return Ok(());
                }
                self.state.busy.synthesizing = false;
                self.notice(
                    NoticeKind::SpeechFailed,
                    "The question could not be read aloud.",
                );
                self.begin_voice_capture();
            }

            Event::PromptPlaybackFinished => self.begin_voice_capture(),

            Event::MicrophoneDenied => {
                self.state.input_mode = InputMode::Text;
                self.state.voice_available = false;
                self.state.busy.recording = false;
                if self.state.phase == Phase::PresentingPrompt {
                    self.state.phase = Phase::CapturingResponse;
                }
                self.notice(
                    NoticeKind::MicrophoneDenied,
                    "Microphone access was denied. Switched to text input.",
                );
            }

            Event::SetInputMode { mode } => {
                if mode == self.state.input_mode {
                    return Ok(());
                }
                if self.state.busy.processing() {
                    return Err(Rejection::Busy);
                }
                match mode {
                    InputMode::Voice => {
                        if !self.state.voice_available {
                            return Err(Rejection::VoiceUnavailable);
                        }
                        self.state.input_mode = InputMode::Voice;
                    }
                    InputMode::Text => {
                        self.state.input_mode = InputMode::Text;
                        self.state.busy.recording = false;
                        if self.state.phase == Phase::PresentingPrompt {
                            self.state.phase = Phase::CapturingResponse;
                        }
                    }
                }
            }

            Event::StartRecording => {
                if !self.state.voice_available {
                    return Err(Rejection::VoiceUnavailable);
                }
                if self.state.busy.processing() {
                    return Err(Rejection::Busy);
                }
                if self.state.input_mode != InputMode::Voice
                    || self.state.phase != Phase::CapturingResponse
                {
                    return Err(self.not_allowed(&event));
                }
                self.state.busy.recording = true;
            }

            Event::StopRecording { ref audio } => {
                if self.state.busy.processing() {
                    return Err(Rejection::Busy);
                }
                if self.state.phase != Phase::CapturingResponse || !self.state.busy.recording {
                    return Err(self.not_allowed(&event));
                }
                self.state.busy.recording = false;
                self.state.busy.transcribing = true;
                self.state.phase = Phase::ProcessingResponse;
                self.effects.push(Effect::Transcribe {
                    turn: self.state.question_index,
                    audio: audio.clone(),
                });
            }

            Event::TranscriptionCompleted { turn, text } => {
                if self.is_stale(turn) || !self.state.busy.transcribing {
                    return Ok(());
                }
                self.state.busy.transcribing = false;
                let text = text.trim();
                if !text.is_empty() {
                    self.commit_answer(text.to_string());
                    return Ok(());
                }
                match policy.empty_response {
                    EmptyResponsePolicy::Skip => {
                        self.notice(
                            NoticeKind::EmptyResponse,
                            "No response was recorded. Moving on to the next question.",
                        );
                        self.advance();
                    }
                    EmptyResponsePolicy::Reprompt => {
                        self.notice(
                            NoticeKind::EmptyResponse,
                            "No response was recorded. Please try again.",
                        );
                        self.state.phase = Phase::CapturingResponse;
                    }
                }
            }

            Event::TranscriptionFailed { turn, .. } => {
                if self.is_stale(turn) || !self.state.busy.transcribing {
                    return Ok(());
                }
                self.state.busy.transcribing = false;
                self.state.phase = Phase::CapturingResponse;
                self.notice(
                    NoticeKind::TranscriptionFailed,
                    "We couldn't transcribe your answer. Please try again.",
                );
            }

            Event::SubmitText { ref text } => {
                if self.state.busy.processing() {
                    return Err(Rejection::Busy);
                }
                if self.state.phase != Phase::CapturingResponse
                    || self.state.input_mode != InputMode::Text
                {
                    return Err(self.not_allowed(&event));
                }
                let text = text.trim();
                if text.is_empty() {
                    self.notice(
                        NoticeKind::EmptyResponse,
                        "Please enter a response before submitting.",
                    );
                    return Ok(());
                }
                self.commit_answer(text.to_string());
            }

            Event::FeedbackReceived { turn, feedback } => {
                if self.is_stale(turn) || !self.state.busy.scoring {
                    return Ok(());
                }
                self.state.busy.scoring = false;
                self.show_feedback(feedback, policy);
            }

            Event::FeedbackFailed { turn, .. } => {
                if self.is_stale(turn) || !self.state.busy.scoring {
                    return Ok(());
                }
                self.state.busy.scoring = false;
                self.notice(
                    NoticeKind::FeedbackFailed,
                    "Feedback is unavailable for this answer. Your response was kept.",
                );
                self.show_feedback(FEEDBACK_FALLBACK.to_string(), policy);
            }

            Event::AutoAdvance { turn } => {
                if self.is_stale(turn)
                    || self.state.phase != Phase::ShowingFeedback
                    || self.state.busy.finishing
                {
                    return Ok(());
                }
                self.advance();
            }

            Event::NextQuestion => {
                if self.state.busy.processing() {
                    return Err(Rejection::Busy);
                }
                match self.state.phase {
                    Phase::ShowingFeedback => {
                        self.effects.push(Effect::CancelAdvance);
                        self.advance();
                    }
                    // Explicit skip: the question stays unanswered.
                    Phase::PresentingPrompt | Phase::CapturingResponse => self.advance(),
                    _ => return Err(self.not_allowed(&event)),
                }
            }

            Event::Finish => {
                if self.state.busy.finishing {
                    return Ok(());
                }
                if self.state.busy.transcribing || self.state.busy.scoring {
                    return Err(Rejection::Busy);
                }
                self.effects.push(Effect::CancelAdvance);
                self.begin_finish();
            }

            Event::PersistSucceeded => {
                if !self.state.busy.finishing {
                    return Ok(());
                }
                self.state.busy.finishing = false;
                self.state.phase = Phase::Finished;
                self.state.redirect = Some(Redirect::Assessment);
                self.effects.push(Effect::HandoffToAssessment);
            }

            Event::PersistFailed { .. } => {
                if !self.state.busy.finishing {
                    return Ok(());
                }
                // Phase is left alone so Finish can be retried.
                self.state.busy.finishing = false;
                self.notice(
                    NoticeKind::PersistFailed,
                    "Your interview could not be saved. Please try finishing again.",
                );
            }

            Event::DismissNotices => self.state.notices.clear(),

            Event::Teardown => {
                self.state.phase = Phase::Abandoned;
                self.state.busy = Busy::default();
                self.effects.push(Effect::CancelAdvance);
            }
        }
        Ok(())
    }

    /// Appends the interviewer turn and an empty pair for the current index.
    fn present_question(&mut self) {
        let Some(question) = self.state.current_question() else {
            return;
        };
        self.state.transcript.push(TranscriptEntry {
            speaker: Speaker::Interviewer,
            text: question.to_string(),
        });
        self.state.qa_pairs.push(QAPair {
            question: question.to_string(),
            answer: String::new(),
        });
        self.state.feedback = None;
        self.state.prompt_audio = None;
        self.state.busy.recording = false;
        self.state.busy.synthesizing = true;
        self.state.phase = match self.state.input_mode {
            InputMode::Voice => Phase::PresentingPrompt,
            InputMode::Text => Phase::CapturingResponse,
        };
        self.effects.push(Effect::SynthesizeSpeech {
            turn: self.state.question_index,
            text: question.to_string(),
        });
    }

    /// Voice mode only: the prompt is done (played, failed or silent), open the mic.
    fn begin_voice_capture(&mut self) {
        if self.state.phase == Phase::PresentingPrompt && self.state.input_mode == InputMode::Voice
        {
            self.state.phase = Phase::CapturingResponse;
            self.state.busy.recording = true;
        }
    }

    fn commit_answer(&mut self, answer: String) {
        let turn = self.state.question_index;
        let Some(pair) = self.state.qa_pairs.get_mut(turn) else {
            return;
        };
        pair.answer = answer.clone();
        let question = pair.question.clone();

        self.state.transcript.push(TranscriptEntry {
            speaker: Speaker::User,
            text: answer.clone(),
        });
        self.state.busy.scoring = true;
        self.state.phase = Phase::ProcessingResponse;

        let scenario = &self.state.scenario;
        self.effects.push(Effect::RequestFeedback {
            turn,
            request: FeedbackRequest {
                answer,
                question,
                persona: scenario.persona.clone(),
                job_description: scenario.job_description(),
                language: prompt_language(&scenario.language),
            },
        });
    }

    fn show_feedback(&mut self, feedback: String, policy: &SessionPolicy) {
        self.state.feedback = Some(feedback);
        self.state.phase = Phase::ShowingFeedback;
        if let Some(after) = policy.auto_advance {
            self.effects.push(Effect::ScheduleAdvance {
                turn: self.state.question_index,
                after,
            });
        }
    }

    fn advance(&mut self) {
        let next = self.state.question_index + 1;
        if next < self.state.questions.len() {
            self.state.question_index = next;
            self.present_question();
        } else {
            self.begin_finish();
        }
    }

    fn begin_finish(&mut self) {
        self.state.busy.recording = false;
        let answered = self.state.answered_pairs();
        if answered.is_empty() {
            self.state.phase = Phase::Abandoned;
            self.state.redirect = Some(Redirect::Setup);
            self.notice(
                NoticeKind::NoResponses,
                "No responses were recorded. Set up a new interview to try again.",
            );
            self.effects.push(Effect::RedirectToSetup);
            return;
        }
        self.state.busy.finishing = true;
        self.effects.push(Effect::PersistHandoff(InterviewData {
            transcript: answered,
            scenario: self.state.scenario.clone(),
        }));
    }
}
