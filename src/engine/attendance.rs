use chrono::NaiveDate;
use tracing::warn;
use ulid::Ulid;

use crate::limits::MAX_REMARK_LEN;
use crate::model::{
    AbsenceEvidence, Booking, BookingEvent, BookingStatus, CompletionEvidence, EvidenceBundle,
    Rating,
};
use crate::notify::AttendanceMail;
use crate::observability;
use crate::roles::Capabilities;
use crate::slots::SlotTime;

use super::conflict::{SlotCandidate, find_conflict};
use super::{Engine, EngineError};

impl Engine {
    /// Verify a lesson as held. Records the session evidence, bumps the
    /// student's lesson counter for counted categories and dispatches the
    /// attendance mail. The counter moves exactly once; a second call sees
    /// an invalid transition.
    pub async fn complete_lesson(
        &self,
        actor: Capabilities,
        id: Ulid,
        evidence: CompletionEvidence,
        remark: Option<String>,
        rating: Option<Rating>,
    ) -> Result<Booking, EngineError> {
        if !actor.verify_attendance {
            return Err(EngineError::Forbidden("verifying attendance"));
        }
        if remark.as_ref().is_some_and(|r| r.len() > MAX_REMARK_LEN) {
            return Err(EngineError::LimitExceeded("remark too long"));
        }
        let mut booking = self.booking_or_err(&id)?;
        if booking.status != BookingStatus::Scheduled {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }

        booking.status = BookingStatus::Completed;
        booking.evidence = Some(EvidenceBundle::Completion(evidence));
        booking.remark = remark;
        booking.rating = rating;
        self.store
            .update_booking(booking.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;

        if booking.category.has_lesson_counter() {
            self.store.modify_student(&booking.student_id, |s| {
                if let Some(counter) = s.counter_mut(booking.category) {
                    counter.completed += 1;
                }
            });
        }

        metrics::counter!(observability::ATTENDANCE_TOTAL, "outcome" => "completed").increment(1);
        self.notify.send(
            booking.instructor_id,
            &BookingEvent::StatusChanged {
                id,
                instructor_id: booking.instructor_id,
                status: BookingStatus::Completed,
            },
        );
        self.send_attendance_mail(&booking).await;
        Ok(booking)
    }

    /// Record a no-show. No counter moves; the slot is released by the
    /// status change so the time can be resold.
    pub async fn mark_absent(
        &self,
        actor: Capabilities,
        id: Ulid,
        evidence: AbsenceEvidence,
    ) -> Result<Booking, EngineError> {
        if !actor.verify_attendance {
            return Err(EngineError::Forbidden("verifying attendance"));
        }
        let mut booking = self.booking_or_err(&id)?;
        if booking.status != BookingStatus::Scheduled {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }

        booking.status = BookingStatus::Absent;
        booking.evidence = Some(EvidenceBundle::Absence(evidence));
        self.store
            .update_booking(booking.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;

        metrics::counter!(observability::ATTENDANCE_TOTAL, "outcome" => "absent").increment(1);
        self.notify.send(
            booking.instructor_id,
            &BookingEvent::StatusChanged {
                id,
                instructor_id: booking.instructor_id,
                status: BookingStatus::Absent,
            },
        );
        self.send_attendance_mail(&booking).await;
        Ok(booking)
    }

    /// Settle an absence after review. With `no_fault` and a replacement
    /// slot the school grants a make-up lesson: a fresh scheduled booking
    /// for the same student, instructor and category. The absent record
    /// stays terminal either way.
    pub async fn resolve_absence(
        &self,
        actor: Capabilities,
        id: Ulid,
        no_fault: bool,
        replacement: Option<(NaiveDate, SlotTime)>,
    ) -> Result<Option<Booking>, EngineError> {
        if !actor.manage_bookings {
            return Err(EngineError::Forbidden("resolving absences"));
        }
        let absent = self.booking_or_err(&id)?;
        if absent.status != BookingStatus::Absent {
            return Err(EngineError::InvalidTransition { from: absent.status });
        }
        let (Some((date, slot)), true) = (replacement, no_fault) else {
            return Ok(None);
        };

        let candidate = SlotCandidate {
            instructor_id: absent.instructor_id,
            student_id: absent.student_id,
            date,
            slot,
        };
        if let Some(conflict) =
            find_conflict(self.store.bookings().iter(), &candidate, None, self.now())
        {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(conflict.into());
        }

        let makeup = Booking::new(
            absent.student_id,
            absent.instructor_id,
            absent.category,
            date,
            slot,
        );
        self.store
            .insert_booking(makeup.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify.send(
            makeup.instructor_id,
            &BookingEvent::Created {
                id: makeup.id,
                instructor_id: makeup.instructor_id,
                student_id: makeup.student_id,
                date,
                slot,
                provisional: false,
            },
        );
        Ok(Some(makeup))
    }

    /// Cancel a scheduled booking without deleting the record.
    pub async fn cancel_booking(
        &self,
        actor: Capabilities,
        id: Ulid,
    ) -> Result<Booking, EngineError> {
        if !actor.manage_bookings {
            return Err(EngineError::Forbidden("cancelling bookings"));
        }
        let mut booking = self.booking_or_err(&id)?;
        if booking.status != BookingStatus::Scheduled {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }
        booking.status = BookingStatus::Cancelled;
        self.store
            .update_booking(booking.clone())
            .map_err(|holder| EngineError::InstructorConflict { booking_id: holder })?;
        self.notify.send(
            booking.instructor_id,
            &BookingEvent::StatusChanged {
                id,
                instructor_id: booking.instructor_id,
                status: BookingStatus::Cancelled,
            },
        );
        Ok(booking)
    }

    /// Mail delivery never blocks the verification outcome; a failed send
    /// is logged and counted.
    async fn send_attendance_mail(&self, booking: &Booking) {
        let Some(evidence) = booking.evidence.as_ref() else {
            return;
        };
        let student = self
            .store
            .get_student(&booking.student_id)
            .map(|s| s.name)
            .unwrap_or_default();
        let instructor = self
            .store
            .get_instructor(&booking.instructor_id)
            .map(|i| i.name)
            .unwrap_or_default();
        let mail =
            AttendanceMail::from_outcome(booking, &student, &instructor, evidence, self.now());
        if let Err(err) = self.mailer.send(&mail).await {
            metrics::counter!(observability::MAIL_FAILURES_TOTAL).increment(1);
            warn!(booking = %booking.id, %err, "attendance mail failed");
        }
    }
}
