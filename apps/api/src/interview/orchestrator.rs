//! Session Orchestrator: the async driver around the pure state machine.
//!
//! `dispatch` is the single entry point. It holds the session lock for the
//! whole transition, runs the returned effects, and feeds follow-up events
//! back through the machine. Remote calls run on spawned tasks and re-enter
//! through `dispatch` when they resolve; nothing mutates the session once its
//! cancellation token has fired.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::gateway::AnalysisGateway;
use crate::interview::machine::{
    self, Busy, Effect, Event, Notice, Phase, Redirect, Rejection, SessionPolicy, SessionState,
};
use crate::interview::models::{InputMode, InterviewData, QAPair, Scenario, TranscriptEntry};
use crate::store::{handoff, KeyValueStore};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct SessionOrchestrator {
    id: Uuid,
    user_id: String,
    state: Mutex<SessionState>,
    policy: SessionPolicy,
    gateway: Arc<dyn AnalysisGateway>,
    store: Arc<dyn KeyValueStore>,
    cancel: CancellationToken,
    advance_timer: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Last client contact, or the moment the session closed.
    last_activity: std::sync::Mutex<Instant>,
}

impl SessionOrchestrator {
    /// Creates the session and presents its first question.
    pub fn start(
        user_id: String,
        scenario: Scenario,
        policy: SessionPolicy,
        gateway: Arc<dyn AnalysisGateway>,
        store: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let first = machine::start(scenario);
        let total = first.state.questions.len();
        let orchestrator = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            state: Mutex::new(first.state),
            policy,
            gateway,
            store,
            cancel: CancellationToken::new(),
            advance_timer: std::sync::Mutex::new(None),
            last_activity: std::sync::Mutex::new(Instant::now()),
        });
        info!(
            "Session {} started for user {} ({total} questions)",
            orchestrator.id, orchestrator.user_id
        );
        for effect in first.effects {
            orchestrator.spawn_effect(effect);
        }
        orchestrator
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.touch();
        SessionSnapshot::new(self.id, &*self.state.lock().await)
    }

    /// True once the session is terminal or torn down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn idle_for(&self) -> Duration {
        self.activity_slot().elapsed()
    }

    /// Applies one client event. A rejection leaves the session untouched.
    pub async fn dispatch(self: &Arc<Self>, event: Event) -> Result<SessionSnapshot, Rejection> {
        self.touch();
        let mut state = self.state.lock().await;
        self.process(&mut state, event).await?;
        Ok(SessionSnapshot::new(self.id, &state))
    }

    /// Abandons the session: the timer is cleared and late results are dropped.
    pub async fn teardown(self: &Arc<Self>) -> SessionSnapshot {
        let mut state = self.state.lock().await;
        if let Err(rejection) = self.process(&mut state, Event::Teardown).await {
            warn!("Session {} teardown rejected: {rejection}", self.id);
        }
        self.close();
        SessionSnapshot::new(self.id, &state)
    }

    async fn process(
        self: &Arc<Self>,
        state: &mut SessionState,
        event: Event,
    ) -> Result<(), Rejection> {
        let mut queue = VecDeque::from([event]);
        let mut first = true;

        while let Some(event) = queue.pop_front() {
            let name = event.name();
            let next = match machine::transition(state, event, &self.policy) {
                Ok(next) => next,
                Err(rejection) if first => {
                    debug!("Session {} rejected {name}: {rejection}", self.id);
                    return Err(rejection);
                }
                Err(rejection) => {
                    warn!("Session {} dropped follow-up {name}: {rejection}", self.id);
                    continue;
                }
            };
            first = false;
            *state = next.state;

            for effect in next.effects {
                match effect {
                    // Inline, under the session lock: a second Finish waits for
                    // this one and then sees a terminal phase.
                    Effect::PersistHandoff(data) => queue.push_back(self.persist(&data).await),
                    other => self.spawn_effect(other),
                }
            }
        }

        if state.phase.is_terminal() {
            self.close();
        }
        Ok(())
    }

    fn spawn_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::SynthesizeSpeech { turn, text } => {
                let gateway = Arc::clone(&self.gateway);
                self.spawn_remote(async move {
                    match gateway.synthesize_speech(&text).await {
                        Ok(audio) => Event::PromptAudioReady { turn, audio },
                        Err(e) => Event::PromptAudioFailed {
                            turn,
                            reason: e.to_string(),
                        },
                    }
                });
            }
            Effect::Transcribe { turn, audio } => {
                let gateway = Arc::clone(&self.gateway);
                self.spawn_remote(async move {
                    match gateway.transcribe_audio(&audio).await {
                        Ok(text) => Event::TranscriptionCompleted { turn, text },
                        Err(e) => Event::TranscriptionFailed {
                            turn,
                            reason: e.to_string(),
                        },
                    }
                });
            }
            Effect::RequestFeedback { turn, request } => {
                let gateway = Arc::clone(&self.gateway);
                self.spawn_remote(async move {
                    match gateway.provide_feedback(&request).await {
                        Ok(feedback) => Event::FeedbackReceived { turn, feedback },
                        Err(e) => Event::FeedbackFailed {
                            turn,
                            reason: e.to_string(),
                        },
                    }
                });
            }
            Effect::ScheduleAdvance { turn, after } => {
                let this = Arc::clone(self);
                let cancel = self.cancel.clone();
                let timer = tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(after) => {
                            // Detached so aborting this timer never interrupts a dispatch.
                            tokio::spawn(this.deliver(Event::AutoAdvance { turn }));
                        }
                    }
                });
                if let Some(previous) = self.timer_slot().replace(timer) {
                    previous.abort();
                }
            }
            Effect::CancelAdvance => self.abort_timer(),
            Effect::PersistHandoff(data) => {
                // Only reachable if a caller bypasses `process`.
                error!(
                    "Session {} asked to persist {} pairs outside dispatch",
                    self.id,
                    data.transcript.len()
                );
            }
            Effect::RedirectToSetup => {
                info!("Session {} ended with no responses; back to setup", self.id)
            }
            Effect::HandoffToAssessment => {
                info!("Session {} finished; handed off to assessment", self.id)
            }
        }
    }

    fn spawn_remote<F>(self: &Arc<Self>, call: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = this.cancel.cancelled() => return,
                event = call => event,
            };
            this.deliver(event).await;
        });
    }

    /// Feeds a remote result back in. Boxed so the spawned tasks that call it
    /// have a nameable type.
    fn deliver(self: Arc<Self>, event: Event) -> BoxFuture {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if self.cancel.is_cancelled() {
                debug!("Session {} closed; discarding {}", self.id, event.name());
                return;
            }
            if let Err(rejection) = self.process(&mut state, event).await {
                warn!("Session {} ignored a remote result: {rejection}", self.id);
            }
        })
    }

    async fn persist(&self, data: &InterviewData) -> Event {
        match handoff::save(self.store.as_ref(), &self.user_id, data).await {
            Ok(()) => {
                info!(
                    "Session {} persisted {} answered questions for {}",
                    self.id,
                    data.transcript.len(),
                    self.user_id
                );
                Event::PersistSucceeded
            }
            Err(e) => {
                error!("Session {} failed to persist handoff: {e}", self.id);
                Event::PersistFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.advance_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn activity_slot(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.activity_slot() = Instant::now();
    }

    fn abort_timer(&self) {
        if let Some(timer) = self.timer_slot().take() {
            timer.abort();
        }
    }

    fn close(&self) {
        if !self.cancel.is_cancelled() {
            self.touch();
        }
        self.abort_timer();
        self.cancel.cancel();
    }
}

/// What a client sees of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: Phase,
    pub scenario: Scenario,
    pub question_index: usize,
    pub total_questions: usize,
    pub current_question: Option<String>,
    pub input_mode: InputMode,
    pub voice_available: bool,
    pub busy: Busy,
    /// True while transcription, feedback scoring or finishing is in flight.
    pub processing: bool,
    pub feedback: Option<String>,
    pub prompt_audio: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub qa_pairs: Vec<QAPair>,
    pub notices: Vec<Notice>,
    pub redirect: Option<Redirect>,
}

impl SessionSnapshot {
    fn new(id: Uuid, state: &SessionState) -> Self {
        Self {
            id,
            phase: state.phase,
            scenario: state.scenario.clone(),
            question_index: state.question_index,
            total_questions: state.questions.len(),
            current_question: state.current_question().map(str::to_string),
            input_mode: state.input_mode,
            voice_available: state.voice_available,
            busy: state.busy,
            processing: state.busy.processing(),
            feedback: state.feedback.clone(),
            prompt_audio: state.prompt_audio.clone(),
            transcript: state.transcript.clone(),
            qa_pairs: state.qa_pairs.clone(),
            notices: state.notices.clone(),
            redirect: state.redirect,
        }
    }
}

/// How long sessions stay in the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRetention {
    /// An open session with no client contact for this long is torn down.
    pub idle_timeout: Duration,
    /// A closed session still answers polls and repeated Finish for this long.
    pub closed_grace: Duration,
    pub sweep_every: Duration,
}

impl Default for SessionRetention {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            closed_grace: Duration::from_secs(2 * 60),
            sweep_every: Duration::from_secs(30),
        }
    }
}

/// Live sessions by id. DELETE removes one at once; everything else leaves
/// through [`SessionRegistry::sweep`].
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionOrchestrator>>>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Arc<SessionOrchestrator>) {
        self.sessions.write().await.insert(session.id(), session);
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionOrchestrator>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<SessionOrchestrator>> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops closed sessions past their grace period and tears down idle ones.
    /// Returns how many were removed.
    pub async fn sweep(&self, retention: &SessionRetention) -> usize {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut removed = 0;

        for session in sessions {
            let idle = session.idle_for();
            if session.is_closed() {
                if idle < retention.closed_grace {
                    continue;
                }
            } else if idle < retention.idle_timeout {
                continue;
            } else {
                info!("Session {} idle for {idle:?}; tearing down", session.id());
                session.teardown().await;
            }
            if self.remove(session.id()).await.is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Runs [`SessionRegistry::sweep`] on a fixed interval until the runtime stops.
    pub fn spawn_reaper(&self, retention: SessionRetention) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(retention.sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = registry.sweep(&retention).await;
                if removed > 0 {
                    info!(
                        "Reaped {removed} sessions ({} still registered)",
                        registry.len().await
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::fake::{FakeGateway, Scripted};
    use crate::interview::machine::{EmptyResponsePolicy, NoticeKind, FEEDBACK_FALLBACK};
    use crate::interview::models::sample_scenario;
    use crate::store::{BrokenStore, MemoryStore};

    const POLICY: SessionPolicy = SessionPolicy {
        auto_advance: Some(Duration::from_secs(4)),
        empty_response: EmptyResponsePolicy::Skip,
    };

    struct Harness {
        gateway: Arc<FakeGateway>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                gateway: Arc::new(FakeGateway::default()),
                store: Arc::new(MemoryStore::default()),
            }
        }

        fn session(&self, mode: InputMode) -> Arc<SessionOrchestrator> {
            self.session_with(mode, POLICY)
        }

        fn session_with(&self, mode: InputMode, policy: SessionPolicy) -> Arc<SessionOrchestrator> {
            SessionOrchestrator::start(
                "user-1".to_string(),
                sample_scenario(mode),
                policy,
                self.gateway.clone(),
                self.store.clone(),
            )
        }

        async fn handoff(&self) -> Option<InterviewData> {
            handoff::load(self.store.as_ref(), "user-1").await.unwrap()
        }
    }

    /// Lets spawned remote calls resolve and re-enter the session.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Records one voice answer and lets transcription resolve.
    async fn speak(session: &Arc<SessionOrchestrator>) -> SessionSnapshot {
        settle().await;
        assert!(session.snapshot().await.busy.recording);
        session
            .dispatch(Event::StopRecording {
                audio: "data:audio/webm;base64,GkXf".to_string(),
            })
            .await
            .unwrap();
        settle().await;
        session.snapshot().await
    }

    async fn answer(session: &Arc<SessionOrchestrator>, text: &str) -> SessionSnapshot {
        session
            .dispatch(Event::SubmitText {
                text: text.to_string(),
            })
            .await
            .unwrap();
        settle().await;
        session.snapshot().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_answer_gets_feedback_then_auto_advances() {
        let h = Harness::new();
        let session = h.session(InputMode::Text);

        let snapshot = answer(&session, "I rebuilt our CI pipeline.").await;
        assert_eq!(snapshot.phase, Phase::ShowingFeedback);
        assert_eq!(snapshot.feedback.as_deref(), Some("Good answer, add a metric."));
        assert_eq!(h.gateway.feedback_count(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.question_index, 1);
        assert_eq!(snapshot.feedback, None);
        assert_eq!(snapshot.phase, Phase::CapturingResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_submission_requests_no_feedback() {
        let h = Harness::new();
        let session = h.session(InputMode::Text);
        let snapshot = answer(&session, "   ").await;
        assert_eq!(h.gateway.feedback_count(), 0);
        assert_eq!(snapshot.qa_pairs[0].answer, "");
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.notices[0].kind, NoticeKind::EmptyResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_prompt_audio_is_delivered() {
        let h = Harness::new();
        let session = h.session(InputMode::Voice);
        settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(h.gateway.speech_count(), 1);
        assert_eq!(
            snapshot.prompt_audio.as_deref(),
            Some("data:audio/mpeg;base64,SUQz")
        );
        assert_eq!(snapshot.phase, Phase::PresentingPrompt);

        let snapshot = session.dispatch(Event::PromptPlaybackFinished).await.unwrap();
        assert!(snapshot.busy.recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_answer_is_transcribed_and_scored() {
        let h = Harness::new();
        h.gateway.set_speech(Scripted::err("speech down"));
        let session = h.session(InputMode::Voice);
        settle().await;
        assert!(session.snapshot().await.busy.recording);

        let snapshot = session
            .dispatch(Event::StopRecording {
                audio: "data:audio/webm;base64,GkXf".to_string(),
            })
            .await
            .unwrap();
        assert!(snapshot.processing);
        settle().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.qa_pairs[0].answer, "I shipped the billing rewrite.");
        assert_eq!(snapshot.phase, Phase::ShowingFeedback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_microphone_denied_at_start_switches_to_text() {
        let h = Harness::new();
        let session = h.session(InputMode::Voice);
        let snapshot = session.dispatch(Event::MicrophoneDenied).await.unwrap();
        assert_eq!(snapshot.input_mode, InputMode::Text);
        assert!(!snapshot.voice_available);
        assert_eq!(snapshot.phase, Phase::CapturingResponse);

        let snapshot = answer(&session, "typed instead").await;
        assert_eq!(snapshot.qa_pairs[0].answer, "typed instead");
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_failure_keeps_session_alive() {
        let h = Harness::new();
        h.gateway.set_feedback(Scripted::err("provider 500"));
        let session = h.session(InputMode::Text);
        let snapshot = answer(&session, "An answer").await;
        assert_eq!(snapshot.feedback.as_deref(), Some(FEEDBACK_FALLBACK));
        assert_eq!(snapshot.qa_pairs[0].answer, "An answer");
        assert!(snapshot
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::FeedbackFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_finish_cancels_auto_advance() {
        let h = Harness::new();
        let session = h.session(InputMode::Text);
        answer(&session, "Only answer").await;

        let snapshot = session.dispatch(Event::Finish).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Finished);
        assert_eq!(snapshot.redirect, Some(Redirect::Assessment));

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.question_index, 0);
        assert_eq!(snapshot.phase, Phase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_twice_writes_one_record() {
        let h = Harness::new();
        let session = h.session(InputMode::Text);
        answer(&session, "First").await;

        let (a, b) = tokio::join!(
            session.dispatch(Event::Finish),
            session.dispatch(Event::Finish)
        );
        assert_eq!(a.unwrap().phase, Phase::Finished);
        assert_eq!(b.unwrap().phase, Phase::Finished);

        let stored = h.handoff().await.unwrap();
        assert_eq!(stored.transcript.len(), 1);
        assert_eq!(stored.transcript[0].answer, "First");
        assert_eq!(stored.scenario, sample_scenario(InputMode::Text));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_no_answers_persists_nothing() {
        let h = Harness::new();
        let session = h.session(InputMode::Text);
        let snapshot = session.dispatch(Event::Finish).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Abandoned);
        assert_eq!(snapshot.redirect, Some(Redirect::Setup));
        assert_eq!(h.handoff().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_failure_blocks_completion() {
        let gateway = Arc::new(FakeGateway::default());
        let session = SessionOrchestrator::start(
            "user-1".to_string(),
            sample_scenario(InputMode::Text),
            SessionPolicy {
                auto_advance: None,
                ..POLICY
            },
            gateway,
            Arc::new(BrokenStore),
        );
        answer(&session, "Answer").await;

        let snapshot = session.dispatch(Event::Finish).await.unwrap();
        assert_eq!(snapshot.phase, Phase::ShowingFeedback);
        assert!(!snapshot.processing);
        assert_eq!(snapshot.notices.last().unwrap().kind, NoticeKind::PersistFailed);
        assert!(!session.snapshot().await.phase.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_after_teardown_are_discarded() {
        let h = Harness::new();
        h.gateway
            .set_feedback(Scripted::ok("Late feedback".to_string()).after(Duration::from_secs(3)));
        let session = h.session(InputMode::Text);
        session
            .dispatch(Event::SubmitText {
                text: "Answer".to_string(),
            })
            .await
            .unwrap();

        let snapshot = session.teardown().await;
        assert_eq!(snapshot.phase, Phase::Abandoned);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.feedback, None);
        assert_eq!(snapshot.phase, Phase::Abandoned);
    }

    #[tokio::test]
    async fn test_registry_lookup_and_removal() {
        let h = Harness::new();
        let registry = SessionRegistry::default();
        let session = h.session(InputMode::Text);
        let id = session.id();
        registry.insert(session).await;
        assert!(registry.get(id).await.is_some());
        assert_eq!(registry.len().await, 1);
        registry.remove(id).await;
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_transcription_skips_to_next_question() {
        let h = Harness::new();
        h.gateway.set_speech(Scripted::err("speech down"));
        h.gateway.set_transcription(Scripted::ok("  ".to_string()));
        let session = h.session(InputMode::Voice);

        let snapshot = speak(&session).await;
        assert_eq!(snapshot.question_index, 1);
        assert!(!snapshot.qa_pairs[0].is_answered());
        assert!(!snapshot.processing);
        assert!(snapshot
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::EmptyResponse));
        assert_eq!(h.gateway.feedback_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_transcription_reprompts_same_question() {
        let h = Harness::new();
        h.gateway.set_speech(Scripted::err("speech down"));
        h.gateway.set_transcription(Scripted::ok(String::new()));
        let session = h.session_with(
            InputMode::Voice,
            SessionPolicy {
                empty_response: EmptyResponsePolicy::Reprompt,
                ..POLICY
            },
        );

        let snapshot = speak(&session).await;
        assert_eq!(snapshot.question_index, 0);
        assert_eq!(snapshot.phase, Phase::CapturingResponse);
        assert!(!snapshot.processing);
        assert_eq!(snapshot.notices.last().unwrap().kind, NoticeKind::EmptyResponse);

        let snapshot = session.dispatch(Event::StartRecording).await.unwrap();
        assert!(snapshot.busy.recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transcription_returns_to_capture() {
        let h = Harness::new();
        h.gateway.set_speech(Scripted::err("speech down"));
        h.gateway
            .set_transcription(Scripted::err("deepgram 502").after(Duration::from_millis(200)));
        let session = h.session(InputMode::Voice);

        let snapshot = speak(&session).await;
        assert!(snapshot.processing);

        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, Phase::CapturingResponse);
        assert_eq!(snapshot.question_index, 0);
        assert!(!snapshot.processing);
        assert!(!snapshot.qa_pairs[0].is_answered());
        assert_eq!(
            snapshot.notices.last().unwrap().kind,
            NoticeKind::TranscriptionFailed
        );
        assert!(session.dispatch(Event::StartRecording).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_drops_session_finished_by_auto_advance() {
        let h = Harness::new();
        let registry = SessionRegistry::default();
        let session = h.session_with(
            InputMode::Text,
            SessionPolicy {
                auto_advance: Some(Duration::from_secs(1)),
                ..POLICY
            },
        );
        let id = session.id();
        registry.insert(Arc::clone(&session)).await;
        let retention = SessionRetention {
            idle_timeout: Duration::from_secs(30 * 60),
            closed_grace: Duration::from_secs(60),
            sweep_every: Duration::from_secs(10),
        };
        let reaper = registry.spawn_reaper(retention);

        let total = session.snapshot().await.total_questions;
        for turn in 0..total {
            answer(&session, &format!("Answer {turn}")).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            settle().await;
        }
        assert!(session.is_closed());
        assert_eq!(h.handoff().await.unwrap().transcript.len(), total);
        assert!(registry.get(id).await.is_some());

        tokio::time::sleep(Duration::from_secs(90)).await;
        settle().await;
        assert_eq!(registry.len().await, 0);
        reaper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_tears_down_idle_sessions() {
        let h = Harness::new();
        let registry = SessionRegistry::default();
        let idle = h.session(InputMode::Text);
        registry.insert(Arc::clone(&idle)).await;
        let retention = SessionRetention::default();

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        let active = h.session(InputMode::Text);
        registry.insert(Arc::clone(&active)).await;
        assert_eq!(registry.sweep(&retention).await, 0);

        tokio::time::sleep(Duration::from_secs(25 * 60)).await;
        assert_eq!(registry.sweep(&retention).await, 1);
        assert!(registry.get(idle.id()).await.is_none());
        assert!(registry.get(active.id()).await.is_some());
        assert_eq!(idle.snapshot().await.phase, Phase::Abandoned);
        assert!(idle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_answers_repeat_finish_during_grace() {
        let h = Harness::new();
        let registry = SessionRegistry::default();
        let session = h.session(InputMode::Text);
        registry.insert(Arc::clone(&session)).await;
        let retention = SessionRetention::default();
        answer(&session, "Only answer").await;

        session.dispatch(Event::Finish).await.unwrap();
        assert_eq!(registry.sweep(&retention).await, 0);
        let again = registry.get(session.id()).await.unwrap();
        let snapshot = again.dispatch(Event::Finish).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Finished);
        assert_eq!(snapshot.redirect, Some(Redirect::Assessment));

        tokio::time::sleep(retention.closed_grace + Duration::from_secs(1)).await;
        assert_eq!(registry.sweep(&retention).await, 1);
        assert_eq!(registry.len().await, 0);
    }
}
