use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use ulid::Ulid;

use crate::limits::{MAX_BATCH_SIZE, MAX_REQUIRED_PER_CATEGORY, RESERVATION_WINDOW_MINUTES};
use crate::model::{Booking, Instructor, VehicleCategory};
use crate::slots::SlotTime;

use super::conflict::{Conflict, SlotCandidate, find_conflict};

/// How many lessons of one category a registration requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPlan {
    pub category: VehicleCategory,
    pub required: u32,
}

/// One slot accepted into the session's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardEntry {
    pub category: VehicleCategory,
    pub instructor_id: Ulid,
    pub date: NaiveDate,
    pub slot: SlotTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// Every category in the plan had required = 0.
    NothingRequired,
    PlanTooLarge,
    /// The named earlier category must be fully scheduled first.
    PriorCategoryIncomplete { blocking: VehicleCategory },
    /// Category is not part of this registration.
    NotInPlan(VehicleCategory),
    /// The continuity lock binds the session to this instructor.
    InstructorLocked { required: Ulid },
    NotCertified {
        instructor_id: Ulid,
        category: VehicleCategory,
    },
    NoInstructorSelected,
    NoSlotSelected,
    /// "Slot no longer available, choose another."
    SlotTaken(Conflict),
    /// The session already accumulated this date/slot.
    DuplicateInSession,
    SessionComplete,
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WizardError::NothingRequired => write!(f, "registration requires no lessons"),
            WizardError::PlanTooLarge => write!(f, "registration requires too many lessons"),
            WizardError::PriorCategoryIncomplete { blocking } => {
                write!(f, "finish scheduling {blocking} lessons first")
            }
            WizardError::NotInPlan(c) => write!(f, "{c} is not part of this registration"),
            WizardError::InstructorLocked { required } => {
                write!(f, "the first two lessons must stay with instructor {required}")
            }
            WizardError::NotCertified { instructor_id, category } => {
                write!(f, "instructor {instructor_id} is not certified for {category}")
            }
            WizardError::NoInstructorSelected => write!(f, "select an instructor first"),
            WizardError::NoSlotSelected => write!(f, "select a date and time first"),
            WizardError::SlotTaken(Conflict::Instructor { .. }) => {
                write!(f, "slot no longer available: instructor already booked")
            }
            WizardError::SlotTaken(Conflict::Student { .. }) => {
                write!(f, "slot no longer available: you already have a lesson then")
            }
            WizardError::DuplicateInSession => {
                write!(f, "this session already picked that date and time")
            }
            WizardError::SessionComplete => write!(f, "every required lesson is scheduled"),
        }
    }
}

impl std::error::Error for WizardError {}

/// Outcome of committing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardProgress {
    /// More slots needed; the active category may have advanced.
    Continue,
    /// Every required slot is filled. The batch is handed to the caller as
    /// a completed unit; nothing was persisted before this point.
    Complete(Vec<WizardEntry>),
}

/// Ephemeral guided booking session. Accumulates one entry per required
/// lesson across the plan's categories, in their fixed presentation order,
/// and hands the finished batch back to the caller. Dropping the session
/// before completion discards everything.
#[derive(Debug, Clone)]
pub struct BookingWizard {
    student_id: Ulid,
    plan: Vec<CategoryPlan>,
    entries: Vec<WizardEntry>,
    active: VehicleCategory,
    instructor: Option<Ulid>,
    pending_slot: Option<(NaiveDate, SlotTime)>,
    complete: bool,
    deadline: Option<DateTime<Utc>>,
}

impl BookingWizard {
    pub fn new(student_id: Ulid, mut plan: Vec<CategoryPlan>) -> Result<Self, WizardError> {
        plan.retain(|p| p.required > 0);
        plan.sort_by_key(|p| p.category);
        plan.dedup_by_key(|p| p.category);
        if plan.is_empty() {
            return Err(WizardError::NothingRequired);
        }
        let total: u64 = plan.iter().map(|p| p.required as u64).sum();
        if total > MAX_BATCH_SIZE as u64
            || plan.iter().any(|p| p.required > MAX_REQUIRED_PER_CATEGORY)
        {
            return Err(WizardError::PlanTooLarge);
        }
        let active = plan[0].category;
        Ok(Self {
            student_id,
            plan,
            entries: Vec::new(),
            active,
            instructor: None,
            pending_slot: None,
            complete: false,
            deadline: None,
        })
    }

    pub fn student_id(&self) -> Ulid {
        self.student_id
    }

    pub fn active_category(&self) -> VehicleCategory {
        self.active
    }

    pub fn entries(&self) -> &[WizardEntry] {
        &self.entries
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Expiry of the provisional batch, stamped when the session completes.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn required_total(&self) -> u32 {
        self.plan.iter().map(|p| p.required).sum()
    }

    fn required_in(&self, category: VehicleCategory) -> u32 {
        self.plan
            .iter()
            .find(|p| p.category == category)
            .map_or(0, |p| p.required)
    }

    fn scheduled_in(&self, category: VehicleCategory) -> u32 {
        self.entries.iter().filter(|e| e.category == category).count() as u32
    }

    /// The continuity lock: after the first entry the session is bound to
    /// that entry's instructor until a second entry exists.
    pub fn locked_instructor(&self) -> Option<Ulid> {
        if self.entries.len() == 1 {
            Some(self.entries[0].instructor_id)
        } else {
            None
        }
    }

    /// Switch the active category. Allowed only once every category ordered
    /// before it has its required count fully scheduled.
    pub fn select_category(&mut self, category: VehicleCategory) -> Result<(), WizardError> {
        if !self.plan.iter().any(|p| p.category == category) {
            return Err(WizardError::NotInPlan(category));
        }
        for p in &self.plan {
            if p.category >= category {
                break;
            }
            if self.scheduled_in(p.category) < p.required {
                return Err(WizardError::PriorCategoryIncomplete { blocking: p.category });
            }
        }
        if category != self.active {
            self.active = category;
            self.pending_slot = None;
            // The continuity lock survives a category switch.
            self.instructor = self.locked_instructor();
        }
        Ok(())
    }

    pub fn select_instructor(&mut self, instructor: &Instructor) -> Result<(), WizardError> {
        if !instructor.teaches(self.active) {
            return Err(WizardError::NotCertified {
                instructor_id: instructor.id,
                category: self.active,
            });
        }
        if let Some(required) = self.locked_instructor()
            && required != instructor.id
        {
            return Err(WizardError::InstructorLocked { required });
        }
        if self.instructor != Some(instructor.id) {
            self.pending_slot = None;
        }
        self.instructor = Some(instructor.id);
        Ok(())
    }

    /// Validate a date/slot against the snapshot and the entries already
    /// accumulated in this session, then stage it for commit.
    pub fn select_slot(
        &mut self,
        date: NaiveDate,
        slot: SlotTime,
        bookings: &[Booking],
        now: DateTime<Utc>,
    ) -> Result<(), WizardError> {
        if self.complete {
            return Err(WizardError::SessionComplete);
        }
        let instructor_id = self.instructor.ok_or(WizardError::NoInstructorSelected)?;
        // The student cannot be in two places at once, so any same date/slot
        // pick inside the session is a duplicate regardless of instructor.
        if self.entries.iter().any(|e| e.date == date && e.slot == slot) {
            return Err(WizardError::DuplicateInSession);
        }
        let candidate = SlotCandidate {
            instructor_id,
            student_id: self.student_id,
            date,
            slot,
        };
        if let Some(conflict) = find_conflict(bookings, &candidate, None, now) {
            return Err(WizardError::SlotTaken(conflict));
        }
        self.pending_slot = Some((date, slot));
        Ok(())
    }

    /// Append the staged selection to the batch. Advances to the next
    /// incomplete category when the active one fills up; returns the whole
    /// batch once the session is complete.
    pub fn commit_entry(&mut self, now: DateTime<Utc>) -> Result<WizardProgress, WizardError> {
        if self.complete {
            return Err(WizardError::SessionComplete);
        }
        let instructor_id = self.instructor.ok_or(WizardError::NoInstructorSelected)?;
        let (date, slot) = self.pending_slot.take().ok_or(WizardError::NoSlotSelected)?;

        self.entries.push(WizardEntry {
            category: self.active,
            instructor_id,
            date,
            slot,
        });

        if self.scheduled_in(self.active) >= self.required_in(self.active) {
            let next = self
                .plan
                .iter()
                .find(|p| self.scheduled_in(p.category) < p.required)
                .map(|p| p.category);
            match next {
                Some(category) => {
                    self.active = category;
                    self.instructor = self.locked_instructor();
                }
                None => {
                    self.complete = true;
                    self.deadline = Some(now + TimeDelta::minutes(RESERVATION_WINDOW_MINUTES));
                    return Ok(WizardProgress::Complete(self.entries.clone()));
                }
            }
        }
        Ok(WizardProgress::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn plan(car: u32, moto: u32) -> Vec<CategoryPlan> {
        vec![
            CategoryPlan { category: VehicleCategory::Car, required: car },
            CategoryPlan { category: VehicleCategory::Motorcycle, required: moto },
        ]
    }

    fn instructor(categories: Vec<VehicleCategory>) -> Instructor {
        Instructor::new("I", categories)
    }

    fn both() -> Instructor {
        instructor(vec![VehicleCategory::Car, VehicleCategory::Motorcycle])
    }

    fn pick(
        w: &mut BookingWizard,
        i: &Instructor,
        d: u32,
        slot: SlotTime,
        now: DateTime<Utc>,
    ) -> WizardProgress {
        w.select_instructor(i).unwrap();
        w.select_slot(date(d), slot, &[], now).unwrap();
        w.commit_entry(now).unwrap()
    }

    #[test]
    fn empty_plan_rejected() {
        let p = vec![CategoryPlan { category: VehicleCategory::Car, required: 0 }];
        assert_eq!(
            BookingWizard::new(Ulid::new(), p).unwrap_err(),
            WizardError::NothingRequired
        );
    }

    #[test]
    fn zero_count_category_skipped() {
        let w = BookingWizard::new(Ulid::new(), plan(0, 2)).unwrap();
        assert_eq!(w.active_category(), VehicleCategory::Motorcycle);
        assert_eq!(w.required_total(), 2);
    }

    #[test]
    fn later_category_blocked_until_prior_complete() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 1)).unwrap();
        assert_eq!(
            w.select_category(VehicleCategory::Motorcycle).unwrap_err(),
            WizardError::PriorCategoryIncomplete { blocking: VehicleCategory::Car }
        );

        let i = both();
        pick(&mut w, &i, 10, SlotTime::hm(8, 0), now);
        // Car done; motorcycle now reachable (and already active).
        w.select_category(VehicleCategory::Motorcycle).unwrap();
    }

    #[test]
    fn selecting_earlier_category_always_allowed() {
        let mut w = BookingWizard::new(Ulid::new(), plan(2, 1)).unwrap();
        w.select_category(VehicleCategory::Car).unwrap();
    }

    #[test]
    fn category_outside_plan_rejected() {
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 0)).unwrap();
        assert_eq!(
            w.select_category(VehicleCategory::Bus).unwrap_err(),
            WizardError::NotInPlan(VehicleCategory::Bus)
        );
    }

    #[test]
    fn uncertified_instructor_rejected() {
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 0)).unwrap();
        let moto_only = instructor(vec![VehicleCategory::Motorcycle]);
        assert!(matches!(
            w.select_instructor(&moto_only).unwrap_err(),
            WizardError::NotCertified { .. }
        ));
    }

    #[test]
    fn continuity_lock_binds_second_entry_then_releases() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(3, 0)).unwrap();
        let first = both();
        let other = both();

        pick(&mut w, &first, 10, SlotTime::hm(8, 0), now);

        // Second entry: locked to the first instructor.
        assert_eq!(
            w.select_instructor(&other).unwrap_err(),
            WizardError::InstructorLocked { required: first.id }
        );
        pick(&mut w, &first, 10, SlotTime::hm(9, 0), now);
        assert_eq!(w.entries()[1].instructor_id, w.entries()[0].instructor_id);

        // Third entry: lock released, free choice again.
        w.select_instructor(&other).unwrap();
        w.select_slot(date(10), SlotTime::hm(10, 0), &[], now).unwrap();
        match w.commit_entry(now).unwrap() {
            WizardProgress::Complete(batch) => {
                assert_eq!(batch[2].instructor_id, other.id);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn continuity_lock_spans_categories() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 2)).unwrap();
        let first = both();
        let other = both();

        pick(&mut w, &first, 10, SlotTime::hm(8, 0), now);
        assert_eq!(w.active_category(), VehicleCategory::Motorcycle);
        // One entry accumulated: still locked, even in the next category.
        assert_eq!(
            w.select_instructor(&other).unwrap_err(),
            WizardError::InstructorLocked { required: first.id }
        );
    }

    #[test]
    fn duplicate_slot_in_session_rejected() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(2, 0)).unwrap();
        let i = both();
        pick(&mut w, &i, 10, SlotTime::hm(8, 0), now);
        w.select_instructor(&i).unwrap();
        assert_eq!(
            w.select_slot(date(10), SlotTime::hm(8, 0), &[], now).unwrap_err(),
            WizardError::DuplicateInSession
        );
    }

    #[test]
    fn conflicting_slot_rejected_at_selection() {
        let now = Utc::now();
        let student = Ulid::new();
        let mut w = BookingWizard::new(student, plan(1, 0)).unwrap();
        let i = both();
        let existing = Booking::new(
            Ulid::new(),
            i.id,
            VehicleCategory::Car,
            date(10),
            SlotTime::hm(14, 0),
        );

        w.select_instructor(&i).unwrap();
        let err = w
            .select_slot(date(10), SlotTime::hm(14, 0), std::slice::from_ref(&existing), now)
            .unwrap_err();
        assert_eq!(
            err,
            WizardError::SlotTaken(Conflict::Instructor { booking_id: existing.id })
        );
    }

    #[test]
    fn commit_without_selection_rejected() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 0)).unwrap();
        assert_eq!(w.commit_entry(now).unwrap_err(), WizardError::NoInstructorSelected);
        w.select_instructor(&both()).unwrap();
        assert_eq!(w.commit_entry(now).unwrap_err(), WizardError::NoSlotSelected);
    }

    #[test]
    fn completion_stamps_deadline_and_seals_session() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(1, 1)).unwrap();
        let i = both();

        assert_eq!(pick(&mut w, &i, 10, SlotTime::hm(8, 0), now), WizardProgress::Continue);
        let done = pick(&mut w, &i, 11, SlotTime::hm(8, 0), now);
        match done {
            WizardProgress::Complete(batch) => assert_eq!(batch.len(), 2),
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(w.is_complete());
        assert_eq!(w.deadline(), Some(now + TimeDelta::minutes(10)));
        assert_eq!(w.commit_entry(now).unwrap_err(), WizardError::SessionComplete);
    }

    #[test]
    fn category_advances_automatically() {
        let now = Utc::now();
        let mut w = BookingWizard::new(Ulid::new(), plan(2, 1)).unwrap();
        let i = both();
        pick(&mut w, &i, 10, SlotTime::hm(8, 0), now);
        assert_eq!(w.active_category(), VehicleCategory::Car);
        pick(&mut w, &i, 10, SlotTime::hm(9, 0), now);
        assert_eq!(w.active_category(), VehicleCategory::Motorcycle);
    }
}
