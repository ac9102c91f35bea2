use std::sync::{Arc, Mutex};
use tracing::debug;

use super::EventInterpreter;
use crate::live::ServerEvent;

/// Most-recent-first caption history limit.
const HISTORY_LIMIT: usize = 5;

/// What to do with the live buffer when the remote marks a turn boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMode {
    /// Flush the trimmed buffer into history on every TurnComplete
    FlushOnTurn,
    /// Ignore turn boundaries; text accumulates until manually cleared
    Accumulate,
}

/// Accumulator for the current utterance plus a bounded history of
/// completed turns (most recent first).
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    live: String,
    history: Vec<String>,
}

impl TranscriptBuffer {
    /// Append a partial transcript, inserting a separating space only when
    /// the buffer is non-empty and does not already end in whitespace.
    pub fn append(&mut self, text: &str) {
        if !self.live.is_empty() && !self.live.ends_with(char::is_whitespace) {
            self.live.push(' ');
        }
        self.live.push_str(text);
    }

    /// Move the trimmed live text into history and clear the buffer.
    /// An all-whitespace buffer flushes to nothing.
    pub fn flush(&mut self) {
        let text = self.live.trim().to_string();
        self.live.clear();
        if text.is_empty() {
            return;
        }
        self.history.insert(0, text);
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Manual clear of the live buffer (the accumulate-mode escape hatch).
    pub fn clear(&mut self) {
        self.live.clear();
    }

    pub fn live(&self) -> &str {
        &self.live
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

/// Captioning strategy: partial transcripts grow the live buffer, turn
/// boundaries flush it into history (when configured to).
pub struct CaptionInterpreter {
    mode: CaptionMode,
    buffer: Arc<Mutex<TranscriptBuffer>>,
}

impl CaptionInterpreter {
    pub fn new(mode: CaptionMode) -> Self {
        Self {
            mode,
            buffer: Arc::new(Mutex::new(TranscriptBuffer::default())),
        }
    }

    /// Shared view of the transcript state for the UI layer.
    pub fn buffer(&self) -> Arc<Mutex<TranscriptBuffer>> {
        Arc::clone(&self.buffer)
    }
}

impl EventInterpreter for CaptionInterpreter {
    fn on_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::PartialTranscript(text) => {
                let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
                buffer.append(text);
            }
            ServerEvent::TurnComplete => {
                if self.mode == CaptionMode::FlushOnTurn {
                    let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
                    buffer.flush();
                }
            }
            other => debug!("caption interpreter ignoring {:?}", other),
        }
    }
}
