pub mod alarm;
pub mod store;

pub use alarm::{AlarmService, AlarmSink};
pub use store::{Medication, ReminderStore};
