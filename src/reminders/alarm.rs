use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::store::{Medication, ReminderStore};

/// Interval between beeps while an alarm rings.
const BEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Audible side of an alarm: the beep oscillator and the one-shot spoken
/// reminder live behind this seam, outside the core.
#[async_trait::async_trait]
pub trait AlarmSink: Send + Sync {
    /// Emit one beep of the alarm tone
    async fn beep(&self);

    /// Speak the reminder text once (one-shot TTS call + playback)
    async fn speak(&self, text: &str) -> Result<()>;
}

struct RingingAlarm {
    medication_id: String,
    beep_task: JoinHandle<()>,
    speak_task: JoinHandle<()>,
}

/// Medication alarm poller.
///
/// One instance per application lifetime, with explicit `start()` and
/// `dispose()`; all alarm state (ticker, beep loop, triggered set) lives
/// here rather than in module globals. On each tick the service compares the
/// current "HH:MM" against the persisted list and fires at most once per
/// (medication id, minute) for the lifetime of the instance.
pub struct AlarmService {
    store: Arc<ReminderStore>,
    sink: Arc<dyn AlarmSink>,
    poll_interval: Duration,
    fired: Arc<Mutex<HashSet<(String, String)>>>,
    ringing: Arc<Mutex<Option<RingingAlarm>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmService {
    pub fn new(store: ReminderStore, sink: Arc<dyn AlarmSink>, poll_interval: Duration) -> Self {
        Self {
            store: Arc::new(store),
            sink,
            poll_interval,
            // Never pruned: one entry per (id, minute) for this session
            fired: Arc::new(Mutex::new(HashSet::new())),
            ringing: Arc::new(Mutex::new(None)),
            poll_task: Mutex::new(None),
        }
    }

    /// Start the tick loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.poll_task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("alarm service already started");
            return;
        }

        info!(
            "alarm service polling every {:?}",
            self.poll_interval
        );
        let service = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.poll_interval);
            loop {
                ticker.tick().await;
                let minute = chrono::Local::now().format("%H:%M").to_string();
                service.poll_once(&minute);
            }
        }));
    }

    /// One poll pass against the given "HH:MM" minute. Driven by the
    /// internal ticker; exposed so a caller can force a check.
    pub fn poll_once(&self, minute: &str) {
        let medications = match self.store.load() {
            Ok(medications) => medications,
            Err(e) => {
                // A broken store must not kill the ticker
                error!("failed to read reminder store: {:#}", e);
                return;
            }
        };

        for medication in medications {
            if medication.time != minute {
                continue;
            }
            let key = (medication.id.clone(), minute.to_string());
            let newly_due = self
                .fired
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key);
            if newly_due {
                self.fire(&medication);
            }
        }
    }

    /// Ring for one due medication: fixed-interval beep loop plus a spoken
    /// reminder. A newer alarm replaces a still-ringing older one.
    fn fire(&self, medication: &Medication) {
        info!(
            "medication due: {} for {} at {}",
            medication.name, medication.patient_name, medication.time
        );

        let beep_sink = Arc::clone(&self.sink);
        let beep_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BEEP_INTERVAL);
            loop {
                ticker.tick().await;
                beep_sink.beep().await;
            }
        });

        let text = format!(
            "Time for {} to take {}, {}",
            medication.patient_name, medication.name, medication.dosage
        );
        let speak_sink = Arc::clone(&self.sink);
        let speak_task = tokio::spawn(async move {
            if let Err(e) = speak_sink.speak(&text).await {
                warn!("spoken reminder failed: {:#}", e);
            }
        });

        let replaced = self
            .ringing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(RingingAlarm {
                medication_id: medication.id.clone(),
                beep_task,
                speak_task,
            });
        if let Some(previous) = replaced {
            // Only one oscillator rings at a time; the previous one-shot
            // announcement is left to finish
            previous.beep_task.abort();
        }
    }

    /// Whether an alarm is currently ringing, and for which medication.
    pub fn ringing(&self) -> Option<String> {
        self.ringing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|alarm| alarm.medication_id.clone())
    }

    /// Silence the current alarm (beep loop and spoken reminder together).
    /// A no-op when nothing rings.
    pub fn acknowledge(&self) {
        let alarm = self.ringing.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(alarm) = alarm {
            info!("alarm acknowledged: {}", alarm.medication_id);
            alarm.beep_task.abort();
            alarm.speak_task.abort();
        }
    }

    /// Full teardown: ticker and any ringing alarm. Idempotent, never fails.
    pub fn dispose(&self) {
        if let Some(task) = self.poll_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        self.acknowledge();
        info!("alarm service disposed");
    }
}

impl Drop for AlarmService {
    fn drop(&mut self) {
        self.dispose();
    }
}
