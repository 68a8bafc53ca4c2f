use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingStatus, VehicleCategory};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    /// The instructor already holds a booking at that date/slot.
    InstructorConflict { booking_id: Ulid },
    /// The student already holds a booking at that date/slot.
    StudentConflict { booking_id: Ulid },
    NotCertified {
        instructor_id: Ulid,
        category: VehicleCategory,
    },
    InvalidTransition { from: BookingStatus },
    /// The booking's date falls inside the freeze window.
    Frozen { date: NaiveDate },
    Forbidden(&'static str),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InstructorConflict { booking_id } => {
                write!(f, "instructor already booked at this time (booking {booking_id})")
            }
            EngineError::StudentConflict { booking_id } => {
                write!(f, "student already has a lesson at this time (booking {booking_id})")
            }
            EngineError::NotCertified { instructor_id, category } => {
                write!(f, "instructor {instructor_id} is not certified for {category}")
            }
            EngineError::InvalidTransition { from } => {
                write!(f, "booking is no longer scheduled (status: {from:?})")
            }
            EngineError::Frozen { date } => {
                write!(f, "booking on {date} is inside the freeze window")
            }
            EngineError::Forbidden(what) => write!(f, "not allowed: {what}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
