use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Booking, DaySlot, DayView, Instructor, VehicleCategory};

use super::availability::{is_day_fully_booked, taken_slots};
use super::{Engine, EngineError};

impl Engine {
    pub fn booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.booking_or_err(&id)
    }

    /// A student's own agenda. Live own provisionals are included; expired
    /// ones are filtered out even before the reaper removes them.
    pub fn bookings_for_student(&self, student_id: Ulid) -> Vec<Booking> {
        let now = self.now();
        let mut rows = self.store.bookings_where(|b| {
            b.student_id == student_id && !b.is_expired_provisional(now)
        });
        rows.sort_by_key(|b| (b.date, b.slot));
        rows
    }

    /// One instructor's agenda for a day, in slot order.
    pub fn bookings_for_instructor(&self, instructor_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        let now = self.now();
        let mut rows = self.store.bookings_where(|b| {
            b.instructor_id == instructor_id
                && b.date == date
                && b.counts_for(None, now)
        });
        rows.sort_by_key(|b| b.slot);
        rows
    }

    /// The wizard's day grid: every slot of the configured teaching day,
    /// marked taken or free from the viewer's perspective.
    pub async fn day_view(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
        viewer: Option<Ulid>,
    ) -> DayView {
        let grid = self.slot_grid().await;
        let now = self.now();
        let bookings = self.store.bookings();
        let taken = taken_slots(&bookings, instructor_id, date, viewer, now);

        let slots: Vec<DaySlot> = grid
            .map(|slot| DaySlot { slot, taken: taken.contains(&slot) })
            .collect();
        let fully_booked = is_day_fully_booked(&bookings, instructor_id, date, viewer, now, slots.len());
        DayView { date, slots, fully_booked }
    }

    /// Instructor choices for one category step of the wizard.
    pub fn available_instructors(&self, category: VehicleCategory) -> Vec<Instructor> {
        let mut rows = self.store.instructors_for(category);
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}
