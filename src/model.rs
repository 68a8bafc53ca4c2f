use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slots::SlotTime;

/// Closed set of vehicle categories. Declaration order is the fixed
/// presentation order the wizard sequences categories by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    Car,
    Motorcycle,
    Bus,
    Truck,
    Trailer,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 5] = [
        VehicleCategory::Car,
        VehicleCategory::Motorcycle,
        VehicleCategory::Bus,
        VehicleCategory::Truck,
        VehicleCategory::Trailer,
    ];

    /// Only car and motorcycle carry contracted/completed lesson counters.
    pub fn has_lesson_counter(&self) -> bool {
        matches!(self, VehicleCategory::Car | VehicleCategory::Motorcycle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::Bus => "bus",
            VehicleCategory::Truck => "truck",
            VehicleCategory::Trailer => "trailer",
        }
    }
}

impl std::fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Booking lifecycle. `Scheduled` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Absent,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Scheduled)
    }

    /// Whether a booking in this status still holds its (instructor, date,
    /// slot) claim. Completed lessons keep the slot for record-keeping;
    /// absent/cancelled/rescheduled free it.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, BookingStatus::Scheduled | BookingStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Photos and coordinates captured at one end of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCapture {
    pub photos: [String; 2],
    pub location: GeoPoint,
}

/// Evidence for a completion outcome: a full capture at session start and
/// another at session end. Constructible only with both triples present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvidence {
    pub start: SessionCapture,
    pub end: SessionCapture,
}

/// Evidence for an absence outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceEvidence {
    pub responsible_photo: String,
    pub location_photo: String,
    pub location: GeoPoint,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvidenceBundle {
    Completion(CompletionEvidence),
    Absence(AbsenceEvidence),
}

impl EvidenceBundle {
    pub fn photo_urls(&self) -> Vec<String> {
        match self {
            EvidenceBundle::Completion(c) => {
                let mut urls = c.start.photos.to_vec();
                urls.extend(c.end.photos.iter().cloned());
                urls
            }
            EvidenceBundle::Absence(a) => {
                vec![a.responsible_photo.clone(), a.location_photo.clone()]
            }
        }
    }

    pub fn locations(&self) -> Vec<GeoPoint> {
        match self {
            EvidenceBundle::Completion(c) => vec![c.start.location, c.end.location],
            EvidenceBundle::Absence(a) => vec![a.location],
        }
    }
}

/// Instructor rating of a verified lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

/// One scheduled unit pairing a student, an instructor, a category and a
/// date/slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub student_id: Ulid,
    pub instructor_id: Ulid,
    pub category: VehicleCategory,
    pub date: NaiveDate,
    pub slot: SlotTime,
    pub status: BookingStatus,
    /// Created before payment confirmation; invisible to everyone but the
    /// owning student until promoted.
    pub provisional: bool,
    /// Server-side lease on a provisional booking.
    pub expires_at: Option<DateTime<Utc>>,
    pub evidence: Option<EvidenceBundle>,
    pub remark: Option<String>,
    pub rating: Option<Rating>,
}

impl Booking {
    pub fn new(
        student_id: Ulid,
        instructor_id: Ulid,
        category: VehicleCategory,
        date: NaiveDate,
        slot: SlotTime,
    ) -> Self {
        Self {
            id: Ulid::new(),
            student_id,
            instructor_id,
            category,
            date,
            slot,
            status: BookingStatus::Scheduled,
            provisional: false,
            expires_at: None,
            evidence: None,
            remark: None,
            rating: None,
        }
    }

    pub fn is_expired_provisional(&self, now: DateTime<Utc>) -> bool {
        self.provisional && self.expires_at.is_some_and(|e| e <= now)
    }

    /// Whether this booking consumes capacity from the given viewer's
    /// perspective. Cancelled/absent/rescheduled rows never count; live
    /// provisional rows count only for their owner; expired provisional
    /// rows count for nobody.
    pub fn counts_for(&self, viewer: Option<Ulid>, now: DateTime<Utc>) -> bool {
        if !self.status.occupies_slot() {
            return false;
        }
        if self.provisional {
            if self.is_expired_provisional(now) {
                return false;
            }
            return viewer == Some(self.student_id);
        }
        true
    }
}

/// Contracted vs completed lessons for one counter-bearing category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCounter {
    pub contracted: u32,
    pub completed: u32,
}

impl LessonCounter {
    pub fn remaining(&self) -> u32 {
        self.contracted.saturating_sub(self.completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Ulid,
    pub name: String,
    pub enrolled: Vec<VehicleCategory>,
    pub car: LessonCounter,
    pub motorcycle: LessonCounter,
    /// Gates promotion of provisional bookings.
    pub payment_confirmed: bool,
}

impl Student {
    pub fn new(name: impl Into<String>, enrolled: Vec<VehicleCategory>) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            enrolled,
            car: LessonCounter::default(),
            motorcycle: LessonCounter::default(),
            payment_confirmed: false,
        }
    }

    pub fn counter(&self, category: VehicleCategory) -> Option<&LessonCounter> {
        match category {
            VehicleCategory::Car => Some(&self.car),
            VehicleCategory::Motorcycle => Some(&self.motorcycle),
            _ => None,
        }
    }

    pub fn counter_mut(&mut self, category: VehicleCategory) -> Option<&mut LessonCounter> {
        match category {
            VehicleCategory::Car => Some(&mut self.car),
            VehicleCategory::Motorcycle => Some(&mut self.motorcycle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: Ulid,
    pub name: String,
    pub categories: Vec<VehicleCategory>,
    pub active: bool,
}

impl Instructor {
    pub fn new(name: impl Into<String>, categories: Vec<VehicleCategory>) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            categories,
            active: true,
        }
    }

    /// Active and certified for the category.
    pub fn teaches(&self, category: VehicleCategory) -> bool {
        self.active && self.categories.contains(&category)
    }
}

/// In-process notification fan-out, keyed by instructor.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    Created {
        id: Ulid,
        instructor_id: Ulid,
        student_id: Ulid,
        date: NaiveDate,
        slot: SlotTime,
        provisional: bool,
    },
    Moved {
        id: Ulid,
        instructor_id: Ulid,
        date: NaiveDate,
        slot: SlotTime,
    },
    StatusChanged {
        id: Ulid,
        instructor_id: Ulid,
        status: BookingStatus,
    },
    Promoted {
        id: Ulid,
        instructor_id: Ulid,
    },
    Deleted {
        id: Ulid,
        instructor_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One row of an instructor's day calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySlot {
    pub slot: SlotTime,
    pub taken: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub date: NaiveDate,
    pub slots: Vec<DaySlot>,
    pub fully_booked: bool,
}
