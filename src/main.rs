use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use echosense::reminders::{AlarmService, AlarmSink, ReminderStore};
use echosense::{
    create_mic_backend, AlertInterpreter, CaptionInterpreter, CaptionMode, CaptureConfig, Config,
    LiveConfig, Supervisor, WsTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Feature {
    /// Live captioning of speech
    Captions,
    /// Environmental sound alerts
    Alerts,
}

#[derive(Debug, Parser)]
#[command(name = "echosense", about = "Live captioning and sound-alert assistant")]
struct Args {
    /// Config file (without extension)
    #[arg(long, default_value = "config/echosense")]
    config: String,

    /// Which live feature to run
    #[arg(long, value_enum, default_value_t = Feature::Captions)]
    feature: Feature,

    /// Accumulate captions instead of flushing on turn boundaries
    #[arg(long)]
    accumulate: bool,
}

/// Alarm sink for terminal sessions: beeps and reminders go to the log.
struct ConsoleAlarmSink;

#[async_trait::async_trait]
impl AlarmSink for ConsoleAlarmSink {
    async fn beep(&self) {
        info!("** alarm beep **");
    }

    async fn speak(&self, text: &str) -> Result<()> {
        info!("reminder: {}", text);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    info!("{} starting", cfg.service.name);

    let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?;
    let transport = Arc::new(WsTransport::new(format!(
        "{}?key={}",
        cfg.live.endpoint, api_key
    )));

    let backend = create_mic_backend(CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        frame_size: cfg.audio.frame_size,
    })?;

    let alarms = Arc::new(AlarmService::new(
        ReminderStore::new(&cfg.reminders.store_path),
        Arc::new(ConsoleAlarmSink),
        Duration::from_secs(cfg.reminders.poll_interval_secs),
    ));
    alarms.start();

    match args.feature {
        Feature::Captions => {
            let mode = if args.accumulate {
                CaptionMode::Accumulate
            } else {
                CaptionMode::FlushOnTurn
            };
            let interpreter = CaptionInterpreter::new(mode);
            let buffer = interpreter.buffer();

            let live = LiveConfig {
                model: cfg.live.model.clone(),
                system_instruction: "Transcribe the speech you hear.".to_string(),
                input_transcription: true,
            };
            let supervisor = Supervisor::new(live, Box::new(interpreter));
            supervisor.start(backend, transport).await?;

            info!("captioning... press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;

            supervisor.stop();
            supervisor.join().await;

            let buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
            if !buffer.live().is_empty() {
                println!("(live) {}", buffer.live());
            }
            for caption in buffer.history() {
                println!("{}", caption);
            }
        }
        Feature::Alerts => {
            let interpreter = AlertInterpreter::new();
            let board = interpreter.board();

            let live = LiveConfig {
                model: cfg.live.model.clone(),
                system_instruction:
                    "Identify environmental sounds and answer with short bracketed tags, e.g. [doorbell]."
                        .to_string(),
                input_transcription: false,
            };
            let supervisor = Supervisor::new(live, Box::new(interpreter));
            supervisor.start(backend, transport).await?;

            info!("listening for sounds... press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;

            supervisor.stop();
            supervisor.join().await;

            let board = board.lock().unwrap_or_else(|e| e.into_inner());
            for alert in board.history() {
                println!("{} {}", alert.created_at.format("%H:%M:%S"), alert.text);
            }
        }
    }

    alarms.dispose();
    Ok(())
}
