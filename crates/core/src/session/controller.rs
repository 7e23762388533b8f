use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, TryRecvError};

use super::error::SessionError;
use super::message::{resolve_terminal, TerminalKind, WorkerMessage};
use super::worker::{self, WorkerContext};
use crate::audio::domain::audio_extractor::AudioExtractor;
use crate::audio::domain::vocal_separator::VocalSeparator;
use crate::transcription::domain::segment::Segment;
use crate::transcription::domain::segment_processor::{split_by_max_words, trim_to_window};
use crate::transcription::domain::speech_model::ModelProvider;
use crate::transcription::domain::transcription_config::TranscriptionConfig;

const WORKER_LOST_TEXT: &str = "Transcription stopped unexpectedly.";
const CANCELLED_TEXT: &str = "Transcription cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl From<TerminalKind> for SessionState {
    fn from(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Complete => SessionState::Complete,
            TerminalKind::Error => SessionState::Error,
            TerminalKind::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Identifies one started session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: u64,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Snapshot returned by [`SessionController::poll`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub progress: f64,
    pub status_text: String,
    pub terminal: Option<TerminalKind>,
}

/// What the caller gets once a session is over.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// Segments already trimmed to the window and split into display units.
    Complete { segments: Vec<Segment> },
    Error { message: String },
    Cancelled { message: String },
}

struct Session {
    id: u64,
    config: Arc<TranscriptionConfig>,
    state: SessionState,
    progress: f64,
    status_text: String,
    terminal: Option<TerminalKind>,
    segments: Vec<Segment>,
    message: String,
    cancelled: Arc<AtomicBool>,
    rx: Receiver<WorkerMessage>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    fn new(
        id: u64,
        config: Arc<TranscriptionConfig>,
        cancelled: Arc<AtomicBool>,
        rx: Receiver<WorkerMessage>,
    ) -> Self {
        Self {
            id,
            config,
            state: SessionState::Running,
            progress: 0.0,
            status_text: "Starting transcription...".to_string(),
            terminal: None,
            segments: Vec::new(),
            message: String::new(),
            cancelled,
            rx,
            worker: None,
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Drain everything queued without blocking.
    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.apply(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.terminal.is_none() {
                        self.worker_lost();
                    }
                    break;
                }
            }
        }
    }

    fn apply(&mut self, message: WorkerMessage) {
        if self.terminal.is_some() {
            log::debug!("ignoring {:?} after terminal state", message.kind());
            return;
        }
        let resolved = resolve_terminal(self.terminal, message.kind(), self.cancel_requested());
        match (resolved, message) {
            (None, WorkerMessage::Progress { fraction, text }) => {
                self.progress = fraction;
                self.status_text = text;
            }
            (Some(TerminalKind::Complete), WorkerMessage::Complete { segments }) => {
                self.segments = segments;
                self.progress = 1.0;
                self.status_text = format!("Transcribed {} segments", self.segments.len());
                self.latch(TerminalKind::Complete);
            }
            (Some(TerminalKind::Error), WorkerMessage::Error { text }) => {
                self.status_text = format!("Error: {text}");
                self.message = text;
                self.latch(TerminalKind::Error);
            }
            (Some(TerminalKind::Cancelled), WorkerMessage::Cancelled { text }) => {
                self.cancelled_with(text);
            }
            (Some(TerminalKind::Cancelled), WorkerMessage::Complete { .. }) => {
                log::info!("completion arrived after cancel request; reporting cancellation");
                self.cancelled_with(CANCELLED_TEXT.to_string());
            }
            (resolved, message) => {
                log::warn!("unexpected {:?} resolved as {resolved:?}", message.kind());
            }
        }
    }

    fn cancelled_with(&mut self, text: String) {
        self.status_text = text.clone();
        self.message = text;
        self.latch(TerminalKind::Cancelled);
    }

    fn worker_lost(&mut self) {
        log::error!("transcription worker exited without a result");
        if self.cancel_requested() {
            self.cancelled_with(CANCELLED_TEXT.to_string());
        } else {
            self.message = WORKER_LOST_TEXT.to_string();
            self.status_text = format!("Error: {WORKER_LOST_TEXT}");
            self.latch(TerminalKind::Error);
        }
    }

    fn latch(&mut self, kind: TerminalKind) {
        self.terminal = Some(kind);
        self.state = kind.into();
    }

    fn snapshot(&self) -> PollResult {
        PollResult {
            progress: self.progress,
            status_text: self.status_text.clone(),
            terminal: self.terminal,
        }
    }
}

/// Owns at most one transcription session and its worker thread.
///
/// Drive it from a steady timer: [`start`](Self::start), then
/// [`poll`](Self::poll) until a terminal kind shows up, then
/// [`finalize`](Self::finalize). `poll` and `request_cancel` never block.
pub struct SessionController {
    models: Arc<dyn ModelProvider>,
    extractor: Arc<dyn AudioExtractor>,
    separator: Option<Arc<dyn VocalSeparator>>,
    session: Option<Session>,
    next_id: u64,
}

impl SessionController {
    pub fn new(models: Arc<dyn ModelProvider>, extractor: Arc<dyn AudioExtractor>) -> Self {
        Self {
            models,
            extractor,
            separator: None,
            session: None,
            next_id: 1,
        }
    }

    pub fn with_separator(mut self, separator: Arc<dyn VocalSeparator>) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state)
    }

    pub fn start(&mut self, config: TranscriptionConfig) -> Result<SessionHandle, SessionError> {
        if let Some(session) = &self.session {
            if session.state == SessionState::Running {
                return Err(SessionError::AlreadyRunning);
            }
            log::debug!("discarding unfinalized session {}", session.id);
        }

        let id = self.next_id;
        self.next_id += 1;

        let config = Arc::new(config);
        let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut session = Session::new(id, config.clone(), cancelled.clone(), rx);

        let handle = worker::spawn(WorkerContext {
            config,
            models: self.models.clone(),
            extractor: self.extractor.clone(),
            separator: self.separator.clone(),
            cancelled,
            tx,
        })
        .map_err(SessionError::Spawn)?;
        session.worker = Some(handle);

        log::info!(
            "session {id} started for {}",
            session.config.source_path.display()
        );
        self.session = Some(session);
        Ok(SessionHandle { id })
    }

    /// Apply every queued worker message and return the latest snapshot.
    pub fn poll(&mut self, handle: SessionHandle) -> Result<PollResult, SessionError> {
        let session = self.session_mut(handle)?;
        session.drain();
        Ok(session.snapshot())
    }

    /// Ask the worker to stop. Safe to call any number of times.
    pub fn request_cancel(&self, handle: SessionHandle) -> Result<(), SessionError> {
        let session = self
            .session
            .as_ref()
            .filter(|s| s.id == handle.id)
            .ok_or(SessionError::UnknownSession(handle.id))?;
        if !session.cancelled.swap(true, Ordering::Relaxed) {
            log::info!("cancel requested for session {}", session.id);
        }
        Ok(())
    }

    /// Consume a finished session and produce its user-facing outcome.
    pub fn finalize(
        &mut self,
        handle: SessionHandle,
        terminal: TerminalKind,
    ) -> Result<TerminalOutcome, SessionError> {
        let session = self.session_mut(handle)?;
        match session.terminal {
            None => return Err(SessionError::NotTerminal),
            Some(actual) if actual != terminal => {
                return Err(SessionError::TerminalMismatch {
                    requested: terminal,
                    actual,
                })
            }
            Some(_) => {}
        }

        let Some(mut session) = self.session.take() else {
            return Err(SessionError::UnknownSession(handle.id));
        };
        if let Some(worker) = session.worker.take() {
            if worker.join().is_err() {
                log::error!("transcription worker panicked");
            }
        }

        let outcome = match terminal {
            TerminalKind::Complete => {
                let window = session.config.window();
                let trimmed = trim_to_window(&session.segments, window.start, window.end);
                let segments = split_by_max_words(&trimmed, session.config.max_words_per_unit);
                log::info!(
                    "session {} finalized with {} display units",
                    session.id,
                    segments.len()
                );
                TerminalOutcome::Complete { segments }
            }
            TerminalKind::Error => TerminalOutcome::Error {
                message: session.message,
            },
            TerminalKind::Cancelled => TerminalOutcome::Cancelled {
                message: session.message,
            },
        };
        Ok(outcome)
    }

    fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut Session, SessionError> {
        self.session
            .as_mut()
            .filter(|s| s.id == handle.id)
            .ok_or(SessionError::UnknownSession(handle.id))
    }
}
