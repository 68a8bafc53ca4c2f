use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::config::ScheduleConfig;
use crate::model::{Booking, Instructor, Student, VehicleCategory};
use crate::slots::SlotTime;

/// Uniqueness key for confirmed occupying bookings.
pub type SlotKey = (Ulid, NaiveDate, SlotTime);

fn claims_slot(b: &Booking) -> bool {
    !b.provisional && b.status.occupies_slot()
}

fn slot_key(b: &Booking) -> SlotKey {
    (b.instructor_id, b.date, b.slot)
}

/// In-memory record store over bookings, students, instructors and the
/// configuration singleton. Every mutation is a single atomic record
/// operation. The slot index enforces at-most-one confirmed occupying
/// booking per (instructor, date, slot) at write time, so two racing
/// submissions cannot both commit.
pub struct BookingStore {
    bookings: DashMap<Ulid, Booking>,
    students: DashMap<Ulid, Student>,
    instructors: DashMap<Ulid, Instructor>,
    slot_index: DashMap<SlotKey, Ulid>,
    config: RwLock<ScheduleConfig>,
}

impl BookingStore {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            bookings: DashMap::new(),
            students: DashMap::new(),
            instructors: DashMap::new(),
            slot_index: DashMap::new(),
            config: RwLock::new(config),
        }
    }

    // ── Configuration singleton ──────────────────────────────

    pub async fn config(&self) -> ScheduleConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: ScheduleConfig) {
        *self.config.write().await = config;
    }

    // ── Slot index ───────────────────────────────────────────

    /// Atomically claim a slot for a booking. Re-claiming one's own slot is
    /// a no-op; a foreign holder is returned as the error.
    pub fn claim_slot(&self, key: SlotKey, booking_id: Ulid) -> Result<(), Ulid> {
        match self.slot_index.entry(key) {
            Entry::Vacant(e) => {
                e.insert(booking_id);
                Ok(())
            }
            Entry::Occupied(e) if *e.get() == booking_id => Ok(()),
            Entry::Occupied(e) => Err(*e.get()),
        }
    }

    /// Release a claim, but only if this booking still holds it.
    pub fn release_slot(&self, key: &SlotKey, booking_id: Ulid) {
        self.slot_index.remove_if(key, |_, held_by| *held_by == booking_id);
    }

    pub fn slot_holder(&self, key: &SlotKey) -> Option<Ulid> {
        self.slot_index.get(key).map(|e| *e.value())
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.clone())
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// Snapshot of the full booking collection. Conflict checks run against
    /// snapshots; the slot index remains the final authority at write time.
    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.clone()).collect()
    }

    pub fn bookings_where(&self, mut pred: impl FnMut(&Booking) -> bool) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.clone())
            .collect()
    }

    /// Insert a booking, claiming its slot first if it is a confirmed
    /// occupying one. On a lost claim nothing is written and the holding
    /// booking id is returned.
    pub fn insert_booking(&self, booking: Booking) -> Result<(), Ulid> {
        if claims_slot(&booking) {
            self.claim_slot(slot_key(&booking), booking.id)?;
        }
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    /// Replace a booking record, moving its slot claim if the slot or the
    /// claim-worthiness changed. On a lost claim the stored record is left
    /// untouched.
    pub fn update_booking(&self, updated: Booking) -> Result<(), Ulid> {
        let old = self.bookings.get(&updated.id).map(|e| e.clone());
        let old_key = old.as_ref().filter(|b| claims_slot(b)).map(slot_key);
        let new_key = claims_slot(&updated).then(|| slot_key(&updated));

        if new_key != old_key {
            if let Some(key) = new_key {
                self.claim_slot(key, updated.id)?;
            }
            if let Some(key) = old_key {
                self.release_slot(&key, updated.id);
            }
        }
        self.bookings.insert(updated.id, updated);
        Ok(())
    }

    pub fn remove_booking(&self, id: &Ulid) -> Option<Booking> {
        let (_, booking) = self.bookings.remove(id)?;
        if claims_slot(&booking) {
            self.release_slot(&slot_key(&booking), booking.id);
        }
        Some(booking)
    }

    // ── Students ─────────────────────────────────────────────

    pub fn insert_student(&self, student: Student) {
        self.students.insert(student.id, student);
    }

    pub fn get_student(&self, id: &Ulid) -> Option<Student> {
        self.students.get(id).map(|e| e.clone())
    }

    /// Mutate a student record in place. Returns false if unknown.
    pub fn modify_student(&self, id: &Ulid, f: impl FnOnce(&mut Student)) -> bool {
        match self.students.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    // ── Instructors ──────────────────────────────────────────

    pub fn insert_instructor(&self, instructor: Instructor) {
        self.instructors.insert(instructor.id, instructor);
    }

    pub fn get_instructor(&self, id: &Ulid) -> Option<Instructor> {
        self.instructors.get(id).map(|e| e.clone())
    }

    pub fn modify_instructor(&self, id: &Ulid, f: impl FnOnce(&mut Instructor)) -> bool {
        match self.instructors.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Active instructors certified for a category, for the wizard's
    /// instructor picker.
    pub fn instructors_for(&self, category: VehicleCategory) -> Vec<Instructor> {
        self.instructors
            .iter()
            .filter(|e| e.teaches(category))
            .map(|e| e.clone())
            .collect()
    }
}
