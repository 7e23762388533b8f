use crate::transcription::domain::segment::Segment;

/// Messages sent from the worker thread to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Progress { fraction: f64, text: String },
    Error { text: String },
    /// Raw segments of the winning pass; not yet trimmed or split.
    Complete { segments: Vec<Segment> },
    Cancelled { text: String },
}

/// Discriminant of a [`WorkerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Progress,
    Error,
    Complete,
    Cancelled,
}

/// Outcome that ends a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    Error,
    Complete,
    Cancelled,
}

impl WorkerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WorkerMessage::Progress { .. } => MessageKind::Progress,
            WorkerMessage::Error { .. } => MessageKind::Error,
            WorkerMessage::Complete { .. } => MessageKind::Complete,
            WorkerMessage::Cancelled { .. } => MessageKind::Cancelled,
        }
    }
}

impl MessageKind {
    pub fn as_terminal(self) -> Option<TerminalKind> {
        match self {
            MessageKind::Progress => None,
            MessageKind::Error => Some(TerminalKind::Error),
            MessageKind::Complete => Some(TerminalKind::Complete),
            MessageKind::Cancelled => Some(TerminalKind::Cancelled),
        }
    }
}

impl std::fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalKind::Error => write!(f, "error"),
            TerminalKind::Complete => write!(f, "complete"),
            TerminalKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Decide which terminal outcome holds after `incoming` arrives.
///
/// The first terminal outcome latches. Progress never resolves anything.
/// A completion that lands after the user asked to cancel counts as a
/// cancellation.
pub fn resolve_terminal(
    current: Option<TerminalKind>,
    incoming: MessageKind,
    cancel_requested: bool,
) -> Option<TerminalKind> {
    if current.is_some() {
        return current;
    }
    match incoming.as_terminal()? {
        TerminalKind::Complete if cancel_requested => Some(TerminalKind::Cancelled),
        terminal => Some(terminal),
    }
}
