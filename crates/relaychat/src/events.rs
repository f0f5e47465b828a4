//! The event feed from the relay core to whatever presents it.
//!
//! The core never calls into a UI. Everything it wants to show goes down
//! an unbounded channel as a [`ChatEvent`]; the receiving side drains it at
//! its own pace.

use std::fmt;

use relaychat_protocol::ChatMessage;
use tokio::sync::mpsc;

/// Lifecycle state of the [`Supervisor`](crate::Supervisor).
///
/// ```text
/// Stopped ──start()──→ Starting ──bind ok──→ Running ──stop()──→ Stopping ──→ Stopped
///                         │                     │                   ↑
///                         └──bind failed──→ Stopped   receive error─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Something the presentation side should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat message to display.
    Message(ChatMessage),

    /// The set of registered nicknames changed. Join order.
    RosterChanged(Vec<String>),

    /// The supervisor moved to `state`. `detail` carries the bound
    /// address on start, or the error that forced a stop.
    Status {
        state: SessionState,
        detail: Option<String>,
    },

    /// A unicast message named a peer that is not registered. The message
    /// was dropped.
    TargetNotFound { sender: String, target: String },
}

/// Receiving half of the event feed.
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Sending half of the event feed.
///
/// Emitting never fails: once the receiver is gone there is nobody left
/// to tell, so events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<ChatEvent>);

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn emit(&self, event: ChatEvent) {
        let _ = self.0.send(event);
    }

    pub(crate) fn status(&self, state: SessionState, detail: Option<String>) {
        self.emit(ChatEvent::Status { state, detail });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Stopped.to_string(), "Stopped");
        assert_eq!(SessionState::Running.to_string(), "Running");
        assert!(SessionState::Running.is_running());
        assert!(!SessionState::Stopping.is_running());
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(ChatEvent::RosterChanged(Vec::new()));
    }

    #[test]
    fn test_emit_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.status(SessionState::Starting, None);
        sink.emit(ChatEvent::RosterChanged(vec!["Alice".into()]));

        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::Status { state: SessionState::Starting, detail: None }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::RosterChanged(vec!["Alice".into()])
        );
    }
}
