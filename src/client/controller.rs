//! The stream controller: one "ask a question" interaction end to end.
//!
//! The controller owns the transcript and at most one live stream session.
//! It never spawns connections itself; `submit`/`regenerate` return the
//! [`ConnectParams`] for the event loop to hand to the transport, and all
//! transport events come back through [`ChatController::handle_event`]. A
//! single cooperative loop processes submits, chunks, and cancellation in
//! arrival order, so the session buffer needs no locking.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use crate::client::bullets::derive_items;
use crate::client::transport::ConnectParams;
use crate::core::chat_stream::StreamMessage;
use crate::core::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl Phase {
    /// Terminal phases leave the controller ready for the next submit.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled | Phase::Failed)
    }
}

/// Bookkeeping for one in-flight chunk-accumulation-and-render cycle.
struct StreamSession {
    stream_id: u64,
    cancel_token: CancellationToken,
    /// Append-only accumulated text for the session's lifetime.
    buffer: String,
}

pub struct ChatController {
    expert: String,
    messages: VecDeque<Message>,
    session: Option<StreamSession>,
    next_stream_id: u64,
    last_query: Option<String>,
    phase: Phase,
    thinking: bool,
}

impl ChatController {
    pub fn new(expert: impl Into<String>) -> Self {
        ChatController {
            expert: expert.into(),
            messages: VecDeque::new(),
            session: None,
            next_stream_id: 0,
            last_query: None,
            phase: Phase::Idle,
            thinking: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The "thinking" indicator: shown from submit until the first chunk.
    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    pub fn messages(&self) -> &VecDeque<Message> {
        &self.messages
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn expert(&self) -> &str {
        &self.expert
    }

    pub fn set_expert(&mut self, expert: impl Into<String>) {
        self.expert = expert.into();
    }

    /// The bullet items of the assistant message currently on screen.
    pub fn assistant_items(&self) -> &[String] {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(|m| m.items.as_slice())
            .unwrap_or(&[])
    }

    fn is_current_stream(&self, stream_id: u64) -> bool {
        self.session
            .as_ref()
            .map(|s| s.stream_id == stream_id)
            .unwrap_or(false)
    }

    /// Release the live session's resources and land in a terminal phase.
    /// Releasing twice is a no-op. A session that never produced content
    /// takes its empty assistant placeholder with it, so back-to-back user
    /// turns end up adjacent and group.
    fn release_session(&mut self, phase: Phase) {
        if let Some(session) = self.session.take() {
            session.cancel_token.cancel();
            self.phase = phase;
            if session.buffer.is_empty() {
                if let Some(back) = self.messages.back() {
                    if back.is_assistant() && back.content.is_empty() {
                        self.messages.pop_back();
                    }
                }
            }
        }
        self.thinking = false;
    }

    /// Submit a question. Returns the connection parameters for the
    /// transport, or `None` when the trimmed query is empty (client-side
    /// validation guard, no network round-trip). Any prior live session is
    /// cancelled first: at most one session is live at a time.
    pub fn submit(&mut self, query: &str) -> Option<ConnectParams> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        self.release_session(Phase::Cancelled);

        let grouped = self
            .messages
            .back()
            .map(|m| m.is_user())
            .unwrap_or(false);
        self.messages.push_back(Message::user(query, grouped));
        self.messages.push_back(Message::assistant_placeholder());

        self.next_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.session = Some(StreamSession {
            stream_id: self.next_stream_id,
            cancel_token: cancel_token.clone(),
            buffer: String::new(),
        });
        self.last_query = Some(query.to_string());
        self.phase = Phase::Connecting;
        self.thinking = true;

        Some(ConnectParams {
            expert: self.expert.clone(),
            query: query.to_string(),
            cancel_token,
            stream_id: self.next_stream_id,
        })
    }

    /// Re-submit the most recently submitted query verbatim with the
    /// unchanged persona. A new session, not a resume of the prior one.
    pub fn regenerate(&mut self) -> Option<ConnectParams> {
        let query = self.last_query.clone()?;
        self.submit(&query)
    }

    /// Explicit cancellation. Partial content already rendered is left
    /// as-is so the user can see what was produced before interruption.
    pub fn cancel(&mut self) {
        self.release_session(Phase::Cancelled);
    }

    /// Process one transport event. Events tagged with a superseded
    /// session's id are ignored.
    pub fn handle_event(&mut self, message: StreamMessage, stream_id: u64) {
        if !self.is_current_stream(stream_id) {
            return;
        }

        match message {
            StreamMessage::Chunk(content) => {
                if self.phase == Phase::Connecting {
                    self.phase = Phase::Streaming;
                    self.thinking = false;
                }
                self.append_chunk(&content);
            }
            StreamMessage::Error(detail) => {
                // Release first so a session that never produced content
                // drops its empty placeholder before the note lands.
                self.release_session(Phase::Failed);
                self.messages.push_back(Message::error_note(detail));
            }
            StreamMessage::End => {
                // Connection closed without an error marker: the buffer is
                // frozen into the final rendered message.
                self.release_session(Phase::Completed);
            }
        }
    }

    /// Append raw chunk text to the session buffer, then re-derive the
    /// assistant message's items from the full accumulated buffer. The
    /// re-derivation is O(total length so far) per chunk by design: earlier
    /// lines may change as bullet markers arrive split across chunks.
    fn append_chunk(&mut self, content: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.buffer.push_str(content);
        let buffer = session.buffer.clone();

        if let Some(message) = self.messages.iter_mut().rev().find(|m| m.is_assistant()) {
            message.items = derive_items(&buffer);
            message.content = buffer;
        }
    }
}
