use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::{MAX_BATCH_SIZE, MAX_NAME_LEN, RESERVATION_WINDOW_MINUTES};
use crate::model::{Booking, BookingEvent, BookingStatus, Instructor, Student, VehicleCategory};
use crate::observability;
use crate::roles::Capabilities;
use crate::slots::SlotTime;
use crate::store::SlotKey;

use super::conflict::{SlotCandidate, find_conflict};
use super::wizard::{BookingWizard, WizardEntry};
use super::{Engine, EngineError, in_freeze_window};

impl Engine {
    // ── People ───────────────────────────────────────────────

    pub async fn upsert_student(&self, student: Student) -> Result<(), EngineError> {
        if student.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("student name too long"));
        }
        self.store.insert_student(student);
        Ok(())
    }

    pub async fn upsert_instructor(&self, instructor: Instructor) -> Result<(), EngineError> {
        if instructor.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("instructor name too long"));
        }
        self.store.insert_instructor(instructor);
        Ok(())
    }

    // ── Single bookings ──────────────────────────────────────

    fn certified(
        &self,
        instructor_id: &Ulid,
        category: VehicleCategory,
    ) -> Result<Instructor, EngineError> {
        let instructor = self
            .store
            .get_instructor(instructor_id)
            .ok_or(EngineError::NotFound(*instructor_id))?;
        if !instructor.teaches(category) {
            return Err(EngineError::NotCertified {
                instructor_id: *instructor_id,
                category,
            });
        }
        Ok(instructor)
    }

    /// Create one confirmed booking, conflict-checked against the snapshot
    /// and settled by the store's slot claim.
    pub async fn create_booking(
        &self,
        student_id: Ulid,
        instructor_id: Ulid,
        category: VehicleCategory,
        date: NaiveDate,
        slot: SlotTime,
    ) -> Result<Booking, EngineError> {
        self.store
            .get_student(&student_id)
            .ok_or(EngineError::NotFound(student_id))?;
        self.certified(&instructor_id, category)?;

        let now = self.now();
        let candidate = SlotCandidate { instructor_id, student_id, date, slot };
        if let Some(conflict) = find_conflict(self.store.bookings().iter(), &candidate, None, now) {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(conflict.into());
        }

        let booking = Booking::new(student_id, instructor_id, category, date, slot);
        self.store
            .insert_booking(booking.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify.send(
            instructor_id,
            &BookingEvent::Created {
                id: booking.id,
                instructor_id,
                student_id,
                date,
                slot,
                provisional: false,
            },
        );
        Ok(booking)
    }

    // ── Wizard batch submission ──────────────────────────────

    /// Submit a completed wizard session, stamping every booking provisional
    /// when payment has not been confirmed yet.
    pub async fn submit_wizard(
        &self,
        wizard: &BookingWizard,
        provisional: bool,
    ) -> Result<Vec<Booking>, EngineError> {
        if !wizard.is_complete() {
            return Err(EngineError::Forbidden("wizard session is not complete"));
        }
        let expires_at = if provisional {
            wizard
                .deadline()
                .or_else(|| Some(self.now() + TimeDelta::minutes(RESERVATION_WINDOW_MINUTES)))
        } else {
            None
        };
        self.submit_batch(wizard.student_id(), wizard.entries(), provisional, expires_at)
            .await
    }

    /// Re-validate and persist a batch of entries as one unit.
    ///
    /// Confirmed batches claim every slot before inserting any record and
    /// roll the claims back on a lost race, so a batch is all-or-nothing.
    /// Provisional batches claim nothing.
    pub async fn submit_batch(
        &self,
        student_id: Ulid,
        entries: &[WizardEntry],
        provisional: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Booking>, EngineError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        self.store
            .get_student(&student_id)
            .ok_or(EngineError::NotFound(student_id))?;

        let now = self.now();
        let snapshot = self.store.bookings();

        // Phase 1: build the records and validate each against the live
        // snapshot plus the earlier records of this batch.
        let mut built: Vec<Booking> = Vec::with_capacity(entries.len());
        for entry in entries {
            self.certified(&entry.instructor_id, entry.category)?;
            let candidate = SlotCandidate {
                instructor_id: entry.instructor_id,
                student_id,
                date: entry.date,
                slot: entry.slot,
            };
            if let Some(conflict) =
                find_conflict(snapshot.iter().chain(built.iter()), &candidate, None, now)
            {
                metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                return Err(conflict.into());
            }
            let mut booking = Booking::new(
                student_id,
                entry.instructor_id,
                entry.category,
                entry.date,
                entry.slot,
            );
            booking.provisional = provisional;
            booking.expires_at = if provisional { expires_at } else { None };
            built.push(booking);
        }

        // Phase 2: claim, then insert. The claim is the race authority; a
        // lost claim releases what this batch already took.
        if !provisional {
            let mut claimed: Vec<SlotKey> = Vec::with_capacity(built.len());
            for b in &built {
                let key = (b.instructor_id, b.date, b.slot);
                if let Err(holder) = self.store.claim_slot(key, b.id) {
                    for key in &claimed {
                        self.store.release_slot(key, key_owner(&built, key));
                    }
                    metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                    return Err(EngineError::InstructorConflict { booking_id: holder });
                }
                claimed.push(key);
            }
        }
        for b in &built {
            // Claims (if any) are already ours; this cannot lose.
            self.store
                .insert_booking(b.clone())
                .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
            self.notify.send(
                b.instructor_id,
                &BookingEvent::Created {
                    id: b.id,
                    instructor_id: b.instructor_id,
                    student_id,
                    date: b.date,
                    slot: b.slot,
                    provisional,
                },
            );
        }

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(built.len() as u64);
        metrics::histogram!(observability::WIZARD_BATCH_SIZE).record(built.len() as f64);
        info!(
            student = %student_id,
            count = built.len(),
            provisional,
            "wizard batch submitted"
        );
        Ok(built)
    }

    // ── Provisional promotion ────────────────────────────────

    /// Flip every live provisional booking of a student to confirmed, in
    /// one batch, after payment confirmation. Re-validates against the
    /// confirmed pool first; a conflict that arose in the meantime is
    /// surfaced, never overwritten. Idempotent: with nothing left to
    /// promote this is a no-op.
    pub async fn confirm_payment(&self, student_id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        self.store
            .get_student(&student_id)
            .ok_or(EngineError::NotFound(student_id))?;

        let now = self.now();
        let provisionals = self.store.bookings_where(|b| {
            b.student_id == student_id
                && b.provisional
                && !b.is_expired_provisional(now)
                && b.status.occupies_slot()
        });

        let snapshot = self.store.bookings();
        for b in &provisionals {
            let candidate = SlotCandidate {
                instructor_id: b.instructor_id,
                student_id,
                date: b.date,
                slot: b.slot,
            };
            if let Some(conflict) = find_conflict(snapshot.iter(), &candidate, Some(b.id), now) {
                metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                return Err(conflict.into());
            }
        }

        // Claim everything before flipping anything.
        let mut claimed: Vec<(SlotKey, Ulid)> = Vec::with_capacity(provisionals.len());
        for b in &provisionals {
            let key = (b.instructor_id, b.date, b.slot);
            if let Err(holder) = self.store.claim_slot(key, b.id) {
                for (key, id) in &claimed {
                    self.store.release_slot(key, *id);
                }
                metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::InstructorConflict { booking_id: holder });
            }
            claimed.push((key, b.id));
        }

        let mut promoted = Vec::with_capacity(provisionals.len());
        for mut b in provisionals {
            b.provisional = false;
            b.expires_at = None;
            let instructor_id = b.instructor_id;
            let id = b.id;
            self.store
                .update_booking(b)
                .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
            self.notify.send(instructor_id, &BookingEvent::Promoted { id, instructor_id });
            promoted.push(id);
        }

        self.store.modify_student(&student_id, |s| s.payment_confirmed = true);
        if !promoted.is_empty() {
            metrics::counter!(observability::BOOKINGS_PROMOTED_TOTAL)
                .increment(promoted.len() as u64);
            info!(student = %student_id, count = promoted.len(), "provisional batch promoted");
        }
        Ok(promoted)
    }

    // ── Operator edit paths ──────────────────────────────────

    /// Reassign a scheduled booking's instructor, date and/or slot.
    pub async fn edit_booking(
        &self,
        actor: Capabilities,
        id: Ulid,
        new_instructor: Option<Ulid>,
        new_date: Option<NaiveDate>,
        new_slot: Option<SlotTime>,
        today: NaiveDate,
    ) -> Result<Booking, EngineError> {
        if !actor.manage_bookings {
            return Err(EngineError::Forbidden("editing bookings"));
        }
        let booking = self.booking_or_err(&id)?;
        if booking.status != BookingStatus::Scheduled {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }
        if in_freeze_window(booking.date, today) {
            return Err(EngineError::Frozen { date: booking.date });
        }

        let mut updated = booking.clone();
        if let Some(instructor_id) = new_instructor {
            self.certified(&instructor_id, updated.category)?;
            updated.instructor_id = instructor_id;
        }
        if let Some(date) = new_date {
            updated.date = date;
        }
        if let Some(slot) = new_slot {
            updated.slot = slot;
        }

        let candidate = SlotCandidate {
            instructor_id: updated.instructor_id,
            student_id: updated.student_id,
            date: updated.date,
            slot: updated.slot,
        };
        if let Some(conflict) =
            find_conflict(self.store.bookings().iter(), &candidate, Some(id), self.now())
        {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(conflict.into());
        }

        self.store
            .update_booking(updated.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;

        if booking.instructor_id != updated.instructor_id {
            self.notify.send(
                booking.instructor_id,
                &BookingEvent::Deleted { id, instructor_id: booking.instructor_id },
            );
        }
        self.notify.send(
            updated.instructor_id,
            &BookingEvent::Moved {
                id,
                instructor_id: updated.instructor_id,
                date: updated.date,
                slot: updated.slot,
            },
        );
        Ok(updated)
    }

    /// Delete a booking outright. Inside the freeze window only the highest
    /// role may still delete.
    pub async fn delete_booking(
        &self,
        actor: Capabilities,
        id: Ulid,
        today: NaiveDate,
    ) -> Result<(), EngineError> {
        if !actor.manage_bookings {
            return Err(EngineError::Forbidden("deleting bookings"));
        }
        let booking = self.booking_or_err(&id)?;
        if in_freeze_window(booking.date, today) && !actor.delete_in_freeze {
            return Err(EngineError::Frozen { date: booking.date });
        }
        self.store.remove_booking(&id);
        metrics::counter!(observability::BOOKINGS_DELETED_TOTAL).increment(1);
        self.notify.send(
            booking.instructor_id,
            &BookingEvent::Deleted { id, instructor_id: booking.instructor_id },
        );
        Ok(())
    }

    /// Move a scheduled booking by replacement: the original is terminally
    /// marked rescheduled and a fresh scheduled booking takes the new slot.
    pub async fn reschedule_booking(
        &self,
        actor: Capabilities,
        id: Ulid,
        date: NaiveDate,
        slot: SlotTime,
        today: NaiveDate,
    ) -> Result<Booking, EngineError> {
        if !actor.manage_bookings {
            return Err(EngineError::Forbidden("rescheduling bookings"));
        }
        let mut original = self.booking_or_err(&id)?;
        if original.status != BookingStatus::Scheduled {
            return Err(EngineError::InvalidTransition { from: original.status });
        }
        if in_freeze_window(original.date, today) {
            return Err(EngineError::Frozen { date: original.date });
        }

        let candidate = SlotCandidate {
            instructor_id: original.instructor_id,
            student_id: original.student_id,
            date,
            slot,
        };
        if let Some(conflict) =
            find_conflict(self.store.bookings().iter(), &candidate, Some(id), self.now())
        {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(conflict.into());
        }

        original.status = BookingStatus::Rescheduled;
        self.store
            .update_booking(original.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
        self.notify.send(
            original.instructor_id,
            &BookingEvent::StatusChanged {
                id,
                instructor_id: original.instructor_id,
                status: BookingStatus::Rescheduled,
            },
        );

        let replacement = Booking::new(
            original.student_id,
            original.instructor_id,
            original.category,
            date,
            slot,
        );
        self.store
            .insert_booking(replacement.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify.send(
            replacement.instructor_id,
            &BookingEvent::Created {
                id: replacement.id,
                instructor_id: replacement.instructor_id,
                student_id: replacement.student_id,
                date,
                slot,
                provisional: false,
            },
        );
        Ok(replacement)
    }

    // ── Provisional expiry ───────────────────────────────────

    pub fn collect_expired_provisionals(&self, now: DateTime<Utc>) -> Vec<Ulid> {
        self.store
            .bookings_where(|b| b.is_expired_provisional(now))
            .into_iter()
            .map(|b| b.id)
            .collect()
    }

    /// Delete every expired unpromoted provisional booking. Returns how
    /// many were purged.
    pub async fn purge_expired_provisionals(&self, now: DateTime<Utc>) -> usize {
        let expired = self.collect_expired_provisionals(now);
        let mut purged = 0;
        for id in expired {
            // Re-check under the current record: promotion may have won.
            let still_expired = self
                .store
                .get_booking(&id)
                .is_some_and(|b| b.is_expired_provisional(now));
            if !still_expired {
                debug!("skip purge of {id}: promoted or already gone");
                continue;
            }
            if let Some(b) = self.store.remove_booking(&id) {
                self.notify.send(
                    b.instructor_id,
                    &BookingEvent::Deleted { id, instructor_id: b.instructor_id },
                );
                purged += 1;
            }
        }
        if purged > 0 {
            metrics::counter!(observability::PROVISIONAL_EXPIRED_TOTAL).increment(purged as u64);
        }
        purged
    }
}

fn key_owner(built: &[Booking], key: &SlotKey) -> Ulid {
    built
        .iter()
        .find(|b| (b.instructor_id, b.date, b.slot) == *key)
        .map(|b| b.id)
        .unwrap_or_default()
}
