mod attendance;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod wizard;

pub use availability::{is_day_fully_booked, is_slot_taken, open_slots, taken_slots};
pub use conflict::{Conflict, SlotCandidate, find_conflict};
pub use error::EngineError;
pub use wizard::{BookingWizard, CategoryPlan, WizardEntry, WizardError, WizardProgress};

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::config::ScheduleConfig;
use crate::model::Booking;
use crate::notify::NotifyHub;
use crate::services::Mailer;
use crate::slots::{SlotSequence, slot_count, slot_sequence};
use crate::store::BookingStore;

/// A scheduled booking can no longer be edited once its date is tomorrow
/// (or earlier) relative to the current day.
pub fn in_freeze_window(booking_date: NaiveDate, today: NaiveDate) -> bool {
    match today.succ_opt() {
        Some(tomorrow) => booking_date <= tomorrow,
        None => true,
    }
}

/// The booking core: owns the record store, fans events out to calendar
/// watchers, and dispatches attendance summaries through the mailer.
pub struct Engine {
    pub store: BookingStore,
    pub notify: Arc<NotifyHub>,
    pub(super) mailer: Arc<dyn Mailer>,
}

impl Engine {
    pub fn new(config: ScheduleConfig, notify: Arc<NotifyHub>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store: BookingStore::new(config),
            notify,
            mailer,
        }
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub(super) fn booking_or_err(&self, id: &Ulid) -> Result<Booking, EngineError> {
        self.store.get_booking(id).ok_or(EngineError::NotFound(*id))
    }

    /// The daily slot grid from the current configuration.
    pub async fn slot_grid(&self) -> SlotSequence {
        slot_sequence(&self.store.config().await)
    }

    pub async fn grid_len(&self) -> usize {
        slot_count(&self.store.config().await)
    }
}
