//! Voice command engine
//!
//! All mutable state (listening state, retry counters, last results and
//! the pending restart) sits behind a single mutex. Callbacks into the
//! adapter, the feedback channel and the action handlers run after the
//! lock is released so they may call back into the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::builder::{EngineBuilder, EngineConfig};
use crate::adapter::{AdapterEvent, SessionAdapter, SessionEvent};
use crate::command::{CommandMatcher, CommandResult, Recognition, VoiceAction};
use crate::dispatch::{Dispatcher, MISSING_DESCRIPTION_PROMPT, READY_PROMPT};
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::retry::{
    ErrorClass, RetryController, RetryDecision, RetryState, SessionErrorCode,
    RETRIES_EXHAUSTED_MESSAGE,
};
use crate::state::{ListeningState, ListeningStateMachine, Transition};

/// Narrated when the recognizer could not be started
pub const ADAPTER_UNAVAILABLE_MESSAGE: &str = "Voice recognition is unavailable. Please try again.";

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: ListeningState,
    pub recognized_text: String,
    pub last_result: Option<CommandResult>,
    pub last_error: Option<String>,
    pub retry: RetryState,
    pub generation: u64,
}

pub(super) struct PendingRestart {
    id: u64,
    handle: JoinHandle<()>,
}

pub(super) struct Inner {
    pub(super) machine: ListeningStateMachine,
    pub(super) retry: RetryController,
    pub(super) recognized_text: String,
    pub(super) last_result: Option<CommandResult>,
    pub(super) last_error: Option<String>,
    /// Last generation handed to the adapter
    pub(super) generation: u64,
    /// Generation whose events are still accepted
    pub(super) active_generation: Option<u64>,
    pub(super) pending_restart: Option<PendingRestart>,
    pub(super) restart_seq: u64,
    pub(super) shut_down: bool,
}

impl Inner {
    fn cancel_restart(&mut self) -> bool {
        match self.pending_restart.take() {
            Some(pending) => {
                pending.handle.abort();
                debug!(restart = pending.id, "pending restart cancelled");
                true
            }
            None => false,
        }
    }
}

pub(super) struct Shared {
    pub(super) inner: Mutex<Inner>,
    pub(super) adapter: Box<dyn SessionAdapter>,
    /// Held from a start/stop/reset state change until the adapter has
    /// been told, so the adapter sees calls in state order
    pub(super) adapter_order: Mutex<()>,
    /// Where restart timers run; adapter events may arrive on any thread
    pub(super) runtime: Option<Handle>,
    pub(super) dispatcher: Dispatcher,
    pub(super) matcher: CommandMatcher,
    pub(super) config: EngineConfig,
    pub(super) event_tx: broadcast::Sender<EngineEvent>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.cancel_restart();
        if !inner.shut_down {
            self.adapter.destroy();
        }
    }
}

/// Side effects collected under the lock and run after it is released
#[derive(Default)]
struct FollowUp {
    utterances: Vec<String>,
    dispatch: Option<VoiceAction>,
}

/// Voice command recognition engine.
///
/// Cloning is cheap and every clone drives the same engine.
#[derive(Clone)]
pub struct VoiceCommandEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for VoiceCommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceCommandEngine")
            .field("state", &self.state())
            .field("retry", &self.retry_state())
            .finish()
    }
}

impl VoiceCommandEngine {
    pub fn builder(adapter: impl SessionAdapter + 'static) -> EngineBuilder {
        EngineBuilder::new(Box::new(adapter))
    }

    pub(super) fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Always taken before `lock`, never while holding it
    fn adapter_turn(&self) -> MutexGuard<'_, ()> {
        self.shared
            .adapter_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: EngineEvent) {
        debug!(%event, "engine event");
        let _ = self.shared.event_tx.send(event);
    }

    fn emit_transition(&self, transition: Option<Transition>) {
        if let Some(t) = transition {
            self.emit(EngineEvent::StateChanged {
                from: t.from,
                to: t.to,
            });
        }
    }

    fn speak(&self, utterance: &str) {
        self.shared.dispatcher.feedback().speak(utterance);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ListeningState {
        self.lock().machine.state().clone()
    }

    pub fn retry_state(&self) -> RetryState {
        self.lock().retry.state()
    }

    /// Generation of the session whose events are currently accepted
    pub fn active_generation(&self) -> Option<u64> {
        self.lock().active_generation
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let inner = self.lock();
        EngineSnapshot {
            state: inner.machine.state().clone(),
            recognized_text: inner.recognized_text.clone(),
            last_result: inner.last_result.clone(),
            last_error: inner.last_error.clone(),
            retry: inner.retry.state(),
            generation: inner.generation,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Classify `text` without touching session state or dispatching
    pub fn recognize(&self, text: &str) -> Recognition {
        self.shared.matcher.recognize(text)
    }

    /// Manually start a session.
    ///
    /// Returns `Ok(false)` when a session is already active; no second
    /// adapter session is opened in that case.
    pub fn start(&self) -> Result<bool, EngineError> {
        self.begin_session(true)
    }

    fn begin_session(&self, manual: bool) -> Result<bool, EngineError> {
        let turn = self.adapter_turn();
        let generation = {
            let mut inner = self.lock();
            if inner.shut_down {
                warn!("start rejected, engine shut down");
                return Err(EngineError::ShutDown);
            }
            if inner.machine.is_active() {
                debug!(generation = inner.generation, "start ignored, session already active");
                return Ok(false);
            }
            inner.cancel_restart();
            if manual {
                inner.retry.rearm();
            }

            inner.generation += 1;
            let generation = inner.generation;
            inner.active_generation = Some(generation);
            let transition = inner.machine.start();
            self.emit_transition(transition);
            generation
        };

        info!(generation, manual, "starting recognition session");
        let config = &self.shared.config;
        if let Err(err) =
            self.shared
                .adapter
                .start_session(generation, &config.language_tag, &config.options)
        {
            error!(%err, generation, "failed to start recognition session");
            {
                let mut inner = self.lock();
                if inner.active_generation == Some(generation) {
                    inner.active_generation = None;
                    inner.last_error = Some(err.to_string());
                    let transition = inner.machine.fail(ADAPTER_UNAVAILABLE_MESSAGE);
                    self.emit_transition(transition);
                }
            }
            drop(turn);
            self.speak(ADAPTER_UNAVAILABLE_MESSAGE);
            return Err(err);
        }
        Ok(true)
    }

    /// Cancel the active session and any pending auto-restart
    pub fn stop(&self) {
        let _turn = self.adapter_turn();
        let stopped = {
            let mut inner = self.lock();
            let cancelled = inner.cancel_restart();
            let transition = inner.machine.stop();
            let stopped = transition.is_some();
            if stopped {
                inner.active_generation = None;
            }
            self.emit_transition(transition);
            if stopped || cancelled {
                info!(stopped, cancelled_restart = cancelled, "stop requested");
            }
            stopped
        };

        if stopped {
            self.shared.adapter.stop_session();
        }
    }

    /// Return to Idle and clear text, results, errors and the retry count
    pub fn reset(&self) {
        let _turn = self.adapter_turn();
        let was_active = {
            let mut inner = self.lock();
            inner.cancel_restart();
            let was_active = inner.machine.is_active();
            let transition = inner.machine.reset();
            inner.active_generation = None;
            inner.retry.reset();
            inner.recognized_text.clear();
            inner.last_result = None;
            inner.last_error = None;
            self.emit_transition(transition);
            was_active
        };

        info!("engine reset");
        if was_active {
            self.shared.adapter.stop_session();
        }
    }

    /// Toggle auto-restart; disabling also drops a pending restart
    pub fn set_auto_restart(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.retry.set_auto_restart(enabled);
        if !enabled {
            inner.cancel_restart();
        }
        info!(enabled, "auto-restart updated");
    }

    /// Process adapter events until the channel closes
    pub async fn run(&self, mut event_rx: mpsc::Receiver<AdapterEvent>) {
        info!("voice command engine started");

        while let Some(event) = event_rx.recv().await {
            self.handle_event(event);
        }

        info!("adapter event channel closed");
    }

    /// Apply one adapter event
    pub fn handle_event(&self, event: AdapterEvent) {
        let AdapterEvent { generation, event } = event;
        let mut follow_up = FollowUp::default();

        {
            let mut inner = self.lock();
            if inner.active_generation != Some(generation) {
                debug!(
                    generation,
                    active = ?inner.active_generation,
                    %event,
                    "ignoring event from inactive session"
                );
                return;
            }

            let transition = inner.machine.on_event(&event);
            self.emit_transition(transition);

            match event {
                SessionEvent::Ready => {
                    if *inner.machine.state() == ListeningState::Listening {
                        follow_up.utterances.push(READY_PROMPT.to_string());
                    }
                }
                SessionEvent::BeginSpeech => {
                    debug!(generation, "speech began");
                }
                SessionEvent::PartialText(text) => {
                    inner.recognized_text = text.clone();
                    self.emit(EngineEvent::TextRecognized {
                        text,
                        is_final: false,
                    });
                }
                SessionEvent::EndOfSpeech => {
                    debug!(generation, "speech ended");
                }
                SessionEvent::FinalText(text) => {
                    self.conclude_with_text(&mut inner, generation, text, &mut follow_up);
                }
                SessionEvent::Error(code) => {
                    self.conclude_with_error(&mut inner, generation, code, &mut follow_up);
                }
            }
        }

        self.run_follow_up(follow_up);
    }

    fn conclude_with_text(
        &self,
        inner: &mut Inner,
        generation: u64,
        text: String,
        follow_up: &mut FollowUp,
    ) {
        inner.active_generation = None;
        inner.retry.on_success();
        inner.recognized_text = text.clone();
        self.emit(EngineEvent::TextRecognized {
            text: text.clone(),
            is_final: true,
        });

        let Recognition { result, action } = self.shared.matcher.recognize(&text);
        info!(generation, ?result, "utterance classified");
        inner.last_result = Some(result.clone());
        self.emit(EngineEvent::CommandRecognized { result });

        match action {
            Some(action) => follow_up.dispatch = Some(action),
            None => follow_up
                .utterances
                .push(MISSING_DESCRIPTION_PROMPT.to_string()),
        }
    }

    fn conclude_with_error(
        &self,
        inner: &mut Inner,
        generation: u64,
        code: SessionErrorCode,
        follow_up: &mut FollowUp,
    ) {
        inner.active_generation = None;
        let class = code.class();
        let message = code.feedback_message();
        warn!(generation, %code, ?class, "recognition session failed");
        self.emit(EngineEvent::SessionError { code, class });
        inner.last_error = Some(message.to_string());

        match inner.retry.on_error(code) {
            RetryDecision::Restart { attempt, delay } => {
                follow_up.utterances.push(message.to_string());
                if self.schedule_restart(inner, delay) {
                    self.emit(EngineEvent::RestartScheduled {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    });
                }
            }
            RetryDecision::Exhausted { attempts } => {
                let transition = inner.machine.fail(RETRIES_EXHAUSTED_MESSAGE);
                self.emit_transition(transition);
                self.emit(EngineEvent::RetriesExhausted { attempts });
                follow_up
                    .utterances
                    .push(RETRIES_EXHAUSTED_MESSAGE.to_string());
            }
            RetryDecision::Surface {
                class: ErrorClass::Terminal,
            } => {
                let transition = inner.machine.fail(message);
                self.emit_transition(transition);
                follow_up.utterances.push(message.to_string());
            }
            RetryDecision::Surface {
                class: ErrorClass::Recoverable,
            } => {
                follow_up.utterances.push(message.to_string());
            }
        }
    }

    /// Spawn the delayed restart; the task holds only a weak handle
    fn schedule_restart(&self, inner: &mut Inner, delay: Duration) -> bool {
        let runtime = match self
            .shared
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        {
            Some(runtime) => runtime,
            None => {
                warn!("no async runtime available, auto-restart skipped");
                return false;
            }
        };

        inner.cancel_restart();
        inner.restart_seq += 1;
        let id = inner.restart_seq;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                VoiceCommandEngine { shared }.fire_restart(id);
            }
        });
        inner.pending_restart = Some(PendingRestart { id, handle });
        true
    }

    fn fire_restart(&self, id: u64) {
        {
            let mut inner = self.lock();
            match &inner.pending_restart {
                Some(pending) if pending.id == id => {}
                _ => {
                    debug!(restart = id, "superseded restart ignored");
                    return;
                }
            }
            inner.pending_restart = None;

            if inner.shut_down || *inner.machine.state() != ListeningState::Idle {
                debug!(state = %inner.machine.state(), "restart skipped, engine not idle");
                return;
            }
            // session-level reset; the retry count carries over
            inner.recognized_text.clear();
            inner.last_result = None;
        }

        info!(restart = id, "auto-restarting recognition session");
        if let Err(err) = self.begin_session(false) {
            warn!(%err, "auto-restart failed");
        }
    }

    fn run_follow_up(&self, follow_up: FollowUp) {
        for utterance in &follow_up.utterances {
            self.speak(utterance);
        }
        if let Some(action) = follow_up.dispatch {
            let handled = self.shared.dispatcher.dispatch(&action);
            self.emit(EngineEvent::ActionDispatched { action, handled });
        }
    }

    /// Stop everything and release the adapter; later starts are rejected
    pub fn shutdown(&self) {
        let _turn = self.adapter_turn();
        let was_active = {
            let mut inner = self.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            inner.cancel_restart();
            let transition = inner.machine.stop();
            inner.active_generation = None;
            let was_active = transition.is_some();
            self.emit_transition(transition);
            was_active
        };

        if was_active {
            self.shared.adapter.stop_session();
        }
        self.shared.adapter.destroy();
        info!("voice command engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SessionOptions;
    use crate::command::{ActionKind, SEND_INCIDENT};
    use crate::dispatch::{ActionHandlers, FeedbackEmitter};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Start(u64),
        Stop,
        Destroy,
    }

    #[derive(Clone, Default)]
    struct MockAdapter {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_start: Arc<AtomicBool>,
    }

    impl MockAdapter {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn starts(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Start(_)))
                .count()
        }

        fn last_generation(&self) -> u64 {
            self.calls()
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::Start(g) => Some(*g),
                    _ => None,
                })
                .unwrap()
        }
    }

    impl SessionAdapter for MockAdapter {
        fn start_session(
            &self,
            generation: u64,
            _language_tag: &str,
            _options: &SessionOptions,
        ) -> Result<(), EngineError> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(EngineError::Adapter("recognizer missing".into()));
            }
            self.calls.lock().unwrap().push(Call::Start(generation));
            Ok(())
        }

        fn stop_session(&self) {
            self.calls.lock().unwrap().push(Call::Stop);
        }

        fn destroy(&self) {
            self.calls.lock().unwrap().push(Call::Destroy);
        }
    }

    #[derive(Clone, Default)]
    struct Spoken(Arc<Mutex<Vec<String>>>);

    impl Spoken {
        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl FeedbackEmitter for Spoken {
        fn speak(&self, utterance: &str) {
            self.0.lock().unwrap().push(utterance.to_string());
        }
    }

    struct Harness {
        engine: VoiceCommandEngine,
        adapter: MockAdapter,
        spoken: Spoken,
    }

    impl Harness {
        fn new(handlers: ActionHandlers) -> Self {
            let adapter = MockAdapter::default();
            let spoken = Spoken::default();
            let engine = VoiceCommandEngine::builder(adapter.clone())
                .feedback(spoken.clone())
                .handlers(handlers)
                .build();
            Self {
                engine,
                adapter,
                spoken,
            }
        }

        fn deliver(&self, event: SessionEvent) {
            let generation = self.adapter.last_generation();
            self.engine.handle_event(AdapterEvent::new(generation, event));
        }

        fn say(&self, text: &str) {
            self.deliver(SessionEvent::EndOfSpeech);
            self.deliver(SessionEvent::FinalText(text.to_string()));
        }
    }

    fn counting(kind: ActionKind) -> (ActionHandlers, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut handlers = ActionHandlers::new();
        handlers.on(kind, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handlers, calls)
    }

    #[test]
    fn test_start_is_idempotent() {
        let h = Harness::new(ActionHandlers::new());
        assert!(h.engine.start().unwrap());
        assert!(!h.engine.start().unwrap());
        assert_eq!(h.adapter.starts(), 1);
        assert_eq!(h.engine.state(), ListeningState::Listening);
    }

    #[test]
    fn test_ready_prompts_user() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Ready);
        assert_eq!(h.spoken.all(), vec![READY_PROMPT.to_string()]);
    }

    #[test]
    fn test_successful_command_dispatches_once() {
        let (handlers, calls) = counting(ActionKind::TriggerSos);
        let h = Harness::new(handlers);
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Ready);
        h.deliver(SessionEvent::PartialText("please".into()));
        h.deliver(SessionEvent::EndOfSpeech);
        assert_eq!(h.engine.state(), ListeningState::Processing);

        h.deliver(SessionEvent::FinalText("please help me".into()));

        assert_eq!(h.engine.state(), ListeningState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.recognized_text, "please help me");
        assert_eq!(
            snapshot.last_result,
            Some(CommandResult::Success {
                command: "send sos".into(),
                action: VoiceAction::TriggerSOS,
            })
        );
        assert!(h
            .spoken
            .all()
            .contains(&"Sending SOS emergency alert.".to_string()));
    }

    #[test]
    fn test_incident_handler_gets_description() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut handlers = ActionHandlers::new();
        handlers.on_report_incident(move |d| *sink.lock().unwrap() = Some(d.to_string()));
        let h = Harness::new(handlers);

        h.engine.start().unwrap();
        h.say("Send incident there is a fire");

        assert_eq!(seen.lock().unwrap().as_deref(), Some("there is a fire"));
        assert!(matches!(
            h.engine.snapshot().last_result,
            Some(CommandResult::Success { ref command, .. }) if command == SEND_INCIDENT
        ));
    }

    #[test]
    fn test_missing_description_dispatches_nothing() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut handlers = ActionHandlers::new();
        handlers.on_report_incident(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let h = Harness::new(handlers);

        h.engine.start().unwrap();
        h.say("send incident");

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.state(), ListeningState::Idle);
        assert_eq!(
            h.engine.snapshot().last_result,
            Some(CommandResult::Error {
                message: "Missing incident description".into()
            })
        );
        assert_eq!(h.spoken.all().last().unwrap(), MISSING_DESCRIPTION_PROMPT);
    }

    #[test]
    fn test_no_match_goes_to_unknown_handler() {
        let (handlers, calls) = counting(ActionKind::Unknown);
        let h = Harness::new(handlers);
        h.engine.start().unwrap();
        h.say("blah blah nonsense");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.snapshot().last_result, Some(CommandResult::NoMatch));
    }

    #[test]
    fn test_events_from_stopped_session_are_ignored() {
        let (handlers, calls) = counting(ActionKind::NavigateToHome);
        let h = Harness::new(handlers);
        h.engine.start().unwrap();
        h.engine.stop();
        assert_eq!(h.adapter.calls(), vec![Call::Start(1), Call::Stop]);

        h.deliver(SessionEvent::FinalText("go home".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.state(), ListeningState::Idle);
        assert_eq!(h.engine.snapshot().last_result, None);
    }

    #[test]
    fn test_only_one_terminal_event_per_session() {
        let (handlers, calls) = counting(ActionKind::ShowAlerts);
        let h = Harness::new(handlers);
        h.engine.start().unwrap();
        h.say("show alerts");
        h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));
        h.deliver(SessionEvent::FinalText("show alerts".into()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.retry_state().count, 0);
        assert_eq!(h.engine.state(), ListeningState::Idle);
    }

    #[test]
    fn test_terminal_error_surfaces_without_retry() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Error(SessionErrorCode::Network));

        let message = SessionErrorCode::Network.feedback_message();
        assert_eq!(h.engine.state(), ListeningState::Error(message.into()));
        assert_eq!(h.engine.retry_state().count, 0);
        assert_eq!(h.spoken.all(), vec![message.to_string()]);
    }

    #[test]
    fn test_recoverable_error_without_auto_restart() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.set_auto_restart(false);
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Error(SessionErrorCode::SpeechTimeout));

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.state, ListeningState::Idle);
        assert_eq!(snapshot.retry.count, 0);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some(SessionErrorCode::SpeechTimeout.feedback_message())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_errors_restart_until_exhausted() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();

        for attempt in 1..=2 {
            h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));
            assert_eq!(h.engine.retry_state().count, attempt);
            assert_eq!(h.engine.state(), ListeningState::Idle);

            tokio::time::sleep(Duration::from_millis(1400)).await;
            assert_eq!(h.adapter.starts(), attempt as usize);

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(h.adapter.starts(), attempt as usize + 1);
            assert_eq!(h.engine.state(), ListeningState::Listening);
        }

        h.deliver(SessionEvent::Error(SessionErrorCode::SpeechTimeout));
        assert_eq!(h.engine.retry_state().count, 3);
        assert_eq!(
            h.engine.state(),
            ListeningState::Error(RETRIES_EXHAUSTED_MESSAGE.into())
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.adapter.starts(), 3);
        assert_eq!(h.spoken.all().last().unwrap(), RETRIES_EXHAUSTED_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_start_after_exhaustion_rearms() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        for _ in 0..3 {
            h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));
            tokio::time::sleep(Duration::from_millis(1600)).await;
        }
        assert_eq!(h.engine.retry_state().count, 3);

        assert!(h.engine.start().unwrap());
        assert_eq!(h.engine.retry_state().count, 0);
        assert_eq!(h.engine.state(), ListeningState::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_backoff_cancels_restart() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Error(SessionErrorCode::SpeechTimeout));
        tokio::time::sleep(Duration::from_millis(500)).await;

        h.engine.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.adapter.starts(), 1);
        assert_eq!(h.engine.state(), ListeningState::Idle);
        assert_eq!(h.engine.retry_state().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_start_during_backoff_supersedes_restart() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));

        h.engine.start().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.adapter.starts(), 2);
        assert_eq!(h.engine.active_generation(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_retry_count() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(h.engine.retry_state().count, 1);

        h.say("go home");
        assert_eq!(h.engine.retry_state().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.deliver(SessionEvent::PartialText("open".into()));
        h.deliver(SessionEvent::Error(SessionErrorCode::NoMatch));

        h.engine.reset();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.state, ListeningState::Idle);
        assert_eq!(snapshot.retry.count, 0);
        assert!(snapshot.recognized_text.is_empty());
        assert_eq!(snapshot.last_error, None);
        assert_eq!(h.adapter.starts(), 1);
    }

    #[test]
    fn test_adapter_failure_surfaces_error() {
        let h = Harness::new(ActionHandlers::new());
        h.adapter.fail_start.store(true, Ordering::SeqCst);

        assert!(matches!(h.engine.start(), Err(EngineError::Adapter(_))));
        assert_eq!(
            h.engine.state(),
            ListeningState::Error(ADAPTER_UNAVAILABLE_MESSAGE.into())
        );
        assert_eq!(h.engine.active_generation(), None);

        h.adapter.fail_start.store(false, Ordering::SeqCst);
        assert!(h.engine.start().unwrap());
    }

    #[test]
    fn test_shutdown_destroys_adapter() {
        let h = Harness::new(ActionHandlers::new());
        h.engine.start().unwrap();
        h.engine.shutdown();

        assert_eq!(
            h.adapter.calls(),
            vec![Call::Start(1), Call::Stop, Call::Destroy]
        );
        assert!(matches!(h.engine.start(), Err(EngineError::ShutDown)));
    }

    #[test]
    fn test_drop_destroys_adapter() {
        let h = Harness::new(ActionHandlers::new());
        let adapter = h.adapter.clone();
        drop(h);
        assert_eq!(adapter.calls(), vec![Call::Destroy]);
    }

    #[test]
    fn test_event_stream_order() {
        let h = Harness::new(ActionHandlers::new());
        let mut rx = h.engine.subscribe();
        h.engine.start().unwrap();
        h.say("open alerts");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events.first(),
            Some(&EngineEvent::StateChanged {
                from: ListeningState::Idle,
                to: ListeningState::Listening,
            })
        );
        let position =
            |pred: fn(&EngineEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
        let recognized = position(|e| matches!(e, EngineEvent::CommandRecognized { .. }));
        let spoken = position(|e| matches!(e, EngineEvent::Feedback { .. }));
        let dispatched = position(|e| matches!(e, EngineEvent::ActionDispatched { .. }));
        assert!(recognized < spoken && spoken < dispatched);
    }

    #[tokio::test]
    async fn test_run_loop_processes_in_order() {
        let (handlers, calls) = counting(ActionKind::NavigateToScan);
        let h = Harness::new(handlers);
        h.engine.start().unwrap();
        let generation = h.adapter.last_generation();

        let (tx, rx) = mpsc::channel(8);
        let engine = h.engine.clone();
        let task = tokio::spawn(async move { engine.run(rx).await });

        for event in [
            SessionEvent::Ready,
            SessionEvent::EndOfSpeech,
            SessionEvent::FinalText("scan area".into()),
        ] {
            tx.send(AdapterEvent::new(generation, event)).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.state(), ListeningState::Idle);
    }

    fn fast_restart() -> EngineConfig {
        EngineConfig {
            restart_delay: Duration::from_millis(20),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_restart_from_event_on_foreign_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let adapter = MockAdapter::default();
        let engine = {
            let _entered = runtime.enter();
            VoiceCommandEngine::builder(adapter.clone())
                .config(fast_restart())
                .build()
        };
        engine.start().unwrap();
        let generation = adapter.last_generation();

        let remote = engine.clone();
        std::thread::spawn(move || {
            remote.handle_event(AdapterEvent::new(
                generation,
                SessionEvent::Error(SessionErrorCode::NoMatch),
            ))
        })
        .join()
        .unwrap();

        for _ in 0..200 {
            if adapter.starts() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(adapter.starts(), 2);
        assert_eq!(engine.retry_state().count, 1);
        assert_eq!(engine.state(), ListeningState::Listening);
    }

    /// Blocks inside `start_session` until released
    struct GatedAdapter {
        inner: MockAdapter,
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SessionAdapter for GatedAdapter {
        fn start_session(
            &self,
            generation: u64,
            language_tag: &str,
            options: &SessionOptions,
        ) -> Result<(), EngineError> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            self.inner.start_session(generation, language_tag, options)
        }

        fn stop_session(&self) {
            self.inner.stop_session();
        }

        fn destroy(&self) {
            self.inner.destroy();
        }
    }

    #[test]
    fn test_stop_during_adapter_start_is_ordered() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let recorder = MockAdapter::default();
        let engine = VoiceCommandEngine::builder(GatedAdapter {
            inner: recorder.clone(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })
        .build();

        let starter = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.start())
        };
        entered_rx.recv().unwrap();
        let stopper = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.stop())
        };

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.calls(), Vec::<Call>::new());

        release_tx.send(()).unwrap();
        assert!(starter.join().unwrap().unwrap());
        stopper.join().unwrap();

        assert_eq!(recorder.calls(), vec![Call::Start(1), Call::Stop]);
        assert_eq!(engine.state(), ListeningState::Idle);
        assert_eq!(engine.active_generation(), None);
    }
}
