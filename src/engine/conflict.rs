use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::model::Booking;
use crate::slots::SlotTime;

use super::EngineError;

/// A candidate (instructor, student, date, slot) tuple to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate {
    pub instructor_id: Ulid,
    pub student_id: Ulid,
    pub date: NaiveDate,
    pub slot: SlotTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Same instructor, same date/slot, different booking.
    Instructor { booking_id: Ulid },
    /// Same student, same date/slot, any instructor.
    Student { booking_id: Ulid },
}

impl From<Conflict> for EngineError {
    fn from(c: Conflict) -> Self {
        match c {
            Conflict::Instructor { booking_id } => EngineError::InstructorConflict { booking_id },
            Conflict::Student { booking_id } => EngineError::StudentConflict { booking_id },
        }
    }
}

/// Check a candidate against a booking snapshot.
///
/// Cancelled and otherwise non-occupying bookings never participate.
/// Provisional bookings participate only against their own creator (the
/// candidate's student), and expired ones against nobody. `exclude` carries
/// the booking id being edited so it cannot conflict with itself.
///
/// When both conflicts apply, the instructor one is reported: it blocks the
/// operator-facing edit path with the more specific message.
pub fn find_conflict<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    candidate: &SlotCandidate,
    exclude: Option<Ulid>,
    now: DateTime<Utc>,
) -> Option<Conflict> {
    let mut student_hit: Option<Conflict> = None;

    for b in bookings {
        if Some(b.id) == exclude {
            continue;
        }
        if b.date != candidate.date || b.slot != candidate.slot {
            continue;
        }
        if !b.counts_for(Some(candidate.student_id), now) {
            continue;
        }
        if b.instructor_id == candidate.instructor_id {
            return Some(Conflict::Instructor { booking_id: b.id });
        }
        if b.student_id == candidate.student_id && student_hit.is_none() {
            student_hit = Some(Conflict::Student { booking_id: b.id });
        }
    }

    student_hit
}
