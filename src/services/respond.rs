//! Reply channel back to the requester

use std::sync::{Mutex, PoisonError};

/// Delivers a message to whoever submitted the request.
///
/// `status` carries an HTTP status when the request came over HTTP; chat
/// replies ignore it.
pub trait Responder: Send + Sync {
    fn respond(&self, status: Option<u16>, message: &str);
}

/// Writes replies to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResponder;

impl Responder for LogResponder {
    fn respond(&self, status: Option<u16>, message: &str) {
        tracing::info!(status = ?status, "{}", message);
    }
}

/// Keeps every reply, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingResponder {
    messages: Mutex<Vec<(Option<u16>, String)>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Option<u16>, String)> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, text)| text).collect()
    }
}

impl Responder for RecordingResponder {
    fn respond(&self, status: Option<u16>, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((status, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_responder_keeps_order() {
        let responder = RecordingResponder::new();
        responder.respond(Some(200), "first");
        responder.respond(None, "second");

        let messages = responder.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], (Some(200), "first".to_string()));
        assert_eq!(responder.texts(), vec!["first", "second"]);
    }
}
