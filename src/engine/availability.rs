use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::model::Booking;
use crate::slots::{SlotSequence, SlotTime};

// ── Availability queries ─────────────────────────────────────────
// Pure functions over a booking snapshot; never mutate. `viewer` is the
// student browsing the calendar, so their own live provisional rows show
// as taken while other students' provisionals stay invisible.

/// Distinct slots taken for one instructor on one day.
pub fn taken_slots(
    bookings: &[Booking],
    instructor_id: Ulid,
    date: NaiveDate,
    viewer: Option<Ulid>,
    now: DateTime<Utc>,
) -> BTreeSet<SlotTime> {
    bookings
        .iter()
        .filter(|b| b.instructor_id == instructor_id && b.date == date)
        .filter(|b| b.counts_for(viewer, now))
        .map(|b| b.slot)
        .collect()
}

pub fn is_slot_taken(
    bookings: &[Booking],
    instructor_id: Ulid,
    date: NaiveDate,
    slot: SlotTime,
    viewer: Option<Ulid>,
    now: DateTime<Utc>,
) -> bool {
    bookings.iter().any(|b| {
        b.instructor_id == instructor_id
            && b.date == date
            && b.slot == slot
            && b.counts_for(viewer, now)
    })
}

/// True when every slot of the daily grid is taken for that instructor.
pub fn is_day_fully_booked(
    bookings: &[Booking],
    instructor_id: Ulid,
    date: NaiveDate,
    viewer: Option<Ulid>,
    now: DateTime<Utc>,
    grid_len: usize,
) -> bool {
    grid_len > 0 && taken_slots(bookings, instructor_id, date, viewer, now).len() >= grid_len
}

/// Slots of the grid still free for that instructor, in grid order.
pub fn open_slots(
    bookings: &[Booking],
    instructor_id: Ulid,
    date: NaiveDate,
    viewer: Option<Ulid>,
    now: DateTime<Utc>,
    grid: SlotSequence,
) -> Vec<SlotTime> {
    let taken = taken_slots(bookings, instructor_id, date, viewer, now);
    grid.filter(|slot| !taken.contains(slot)).collect()
}
