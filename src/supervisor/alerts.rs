use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::EventInterpreter;
use crate::live::ServerEvent;

/// How many alerts stay on screen at once.
const LIVE_LIMIT: usize = 3;

/// How many alerts the history retains.
const HISTORY_LIMIT: usize = 10;

/// How long a live alert stays visible.
pub const ALERT_TTL: Duration = Duration::from_secs(6);

/// One detected environmental sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Bounded live display set plus bounded history, both most recent first.
#[derive(Debug, Default)]
pub struct AlertBoard {
    live: Vec<AlertEvent>,
    history: Vec<AlertEvent>,
}

impl AlertBoard {
    /// Front-insert into both lists, trimming each to its cap.
    pub fn insert(&mut self, alert: AlertEvent) {
        self.live.insert(0, alert.clone());
        self.live.truncate(LIVE_LIMIT);
        self.history.insert(0, alert);
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Drop one entry from the live display; history keeps it.
    pub fn expire(&mut self, id: Uuid) {
        self.live.retain(|alert| alert.id != id);
    }

    pub fn live(&self) -> &[AlertEvent] {
        &self.live
    }

    pub fn history(&self) -> &[AlertEvent] {
        &self.history
    }
}

/// Pull bracket-delimited tags out of model text: `"[doorbell] nearby"`
/// yields `["doorbell"]`. Text without a complete `[...]` pair yields
/// nothing.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) => {
                let tag = after[..close].trim();
                if !tag.is_empty() {
                    tags.push(tag.to_string());
                }
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    tags
}

/// Sound-alert strategy: model text is scanned for bracket tags; each tag
/// becomes an alert that self-expires from the live display after
/// [`ALERT_TTL`], independent of later arrivals.
pub struct AlertInterpreter {
    board: Arc<Mutex<AlertBoard>>,
    timers: Vec<JoinHandle<()>>,
}

impl AlertInterpreter {
    pub fn new() -> Self {
        Self {
            board: Arc::new(Mutex::new(AlertBoard::default())),
            timers: Vec::new(),
        }
    }

    /// Shared view of the alert state for the UI layer.
    pub fn board(&self) -> Arc<Mutex<AlertBoard>> {
        Arc::clone(&self.board)
    }
}

impl Default for AlertInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventInterpreter for AlertInterpreter {
    fn on_event(&mut self, event: &ServerEvent) {
        let ServerEvent::ModelText(text) = event else {
            debug!("alert interpreter ignoring {:?}", event);
            return;
        };

        for tag in extract_tags(text) {
            let alert = AlertEvent::new(tag);
            let id = alert.id;
            info!("sound alert: {}", alert.text);

            self.board
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(alert);

            // Per-entry expiry timer; unrelated arrivals never disturb it
            let board = Arc::clone(&self.board);
            self.timers.push(tokio::spawn(async move {
                tokio::time::sleep(ALERT_TTL).await;
                board.lock().unwrap_or_else(|e| e.into_inner()).expire(id);
            }));
        }

        self.timers.retain(|timer| !timer.is_finished());
    }

    fn on_teardown(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bracketed_tags() {
        assert_eq!(extract_tags("[doorbell]"), ["doorbell"]);
        assert_eq!(
            extract_tags("[siren] passing, then a [car horn]"),
            ["siren", "car horn"]
        );
        assert!(extract_tags("no tags here").is_empty());
        assert!(extract_tags("unterminated [tag").is_empty());
        assert!(extract_tags("[]").is_empty());
    }

    #[test]
    fn live_list_keeps_most_recent_three() {
        let mut board = AlertBoard::default();
        for i in 0..4 {
            board.insert(AlertEvent::new(format!("alert{}", i)));
        }
        assert_eq!(board.live().len(), 3);
        assert_eq!(board.live()[0].text, "alert3");
        assert_eq!(board.live()[2].text, "alert1");
        assert_eq!(board.history().len(), 4);
    }

    #[test]
    fn history_caps_at_ten() {
        let mut board = AlertBoard::default();
        for i in 0..12 {
            board.insert(AlertEvent::new(format!("alert{}", i)));
        }
        assert_eq!(board.history().len(), 10);
        assert_eq!(board.history()[0].text, "alert11");
    }

    #[test]
    fn expire_removes_live_entry_only() {
        let mut board = AlertBoard::default();
        let alert = AlertEvent::new("doorbell");
        let id = alert.id;
        board.insert(alert);
        board.expire(id);
        assert!(board.live().is_empty());
        assert_eq!(board.history().len(), 1);
    }
}
