use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioSettings,
    pub live: LiveSettings,
    pub reminders: ReminderSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub frame_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct LiveSettings {
    /// Remote model identifier
    pub model: String,
    /// WebSocket endpoint (API key appended at runtime)
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct ReminderSettings {
    pub store_path: String,
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
