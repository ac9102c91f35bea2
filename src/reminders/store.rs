use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// One medication reminder record, as persisted by the reminder UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub patient_name: String,
    pub dosage: String,
    /// Due time of day, "HH:MM"
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// JSON-encoded medication list under a fixed path.
///
/// The reminder UI reads and writes it; the alarm poller only reads, once
/// per tick.
pub struct ReminderStore {
    path: PathBuf,
}

impl ReminderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the full list. A missing store is an empty list, not an error.
    pub fn load(&self) -> Result<Vec<Medication>> {
        if !self.path.exists() {
            debug!("reminder store {:?} not found, treating as empty", self.path);
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read reminder store {:?}", self.path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("reminder store {:?} is not a medication list", self.path))
    }

    /// Replace the full list.
    pub fn save(&self, medications: &[Medication]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {:?}", parent))?;
        }
        let raw = serde_json::to_string_pretty(medications)
            .context("failed to serialize medication list")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write reminder store {:?}", self.path))
    }
}
