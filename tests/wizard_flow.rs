//! End-to-end run of the guided booking flow: plan, continuity lock,
//! provisional submission, payment promotion and attendance verification.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use lectio::config::ScheduleConfig;
use lectio::engine::{BookingWizard, CategoryPlan, Engine, WizardError, WizardProgress};
use lectio::model::{GeoPoint, Instructor, Rating, Student, VehicleCategory};
use lectio::notify::NotifyHub;
use lectio::roles::{Role, resolve};
use lectio::services::{CaptureDraft, FixedGeo, MemoryMailer, MemoryUploader};
use lectio::slots::SlotTime;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

#[tokio::test]
async fn guided_flow_from_plan_to_verified_lesson() {
    let _ = tracing_subscriber::fmt::try_init();
    let mailer = Arc::new(MemoryMailer::new());
    let engine = Arc::new(Engine::new(
        ScheduleConfig::default(),
        Arc::new(NotifyHub::new()),
        mailer.clone(),
    ));

    let mut student = Student::new("Ana", vec![VehicleCategory::Car, VehicleCategory::Motorcycle]);
    student.car.contracted = 2;
    student.motorcycle.contracted = 1;
    let student_id = student.id;
    engine.upsert_student(student).await.unwrap();

    let marcos = Instructor::new(
        "Marcos",
        vec![VehicleCategory::Car, VehicleCategory::Motorcycle],
    );
    let zoe = Instructor::new("Zoe", vec![VehicleCategory::Motorcycle]);
    engine.upsert_instructor(marcos.clone()).await.unwrap();
    engine.upsert_instructor(zoe.clone()).await.unwrap();

    let now = Utc::now();
    let mut wizard = BookingWizard::new(
        student_id,
        vec![
            CategoryPlan { category: VehicleCategory::Car, required: 2 },
            CategoryPlan { category: VehicleCategory::Motorcycle, required: 1 },
        ],
    )
    .unwrap();

    // Car lessons come first in the fixed category order.
    assert_eq!(wizard.active_category(), VehicleCategory::Car);
    let snapshot = engine.store.bookings();
    wizard.select_instructor(&marcos).unwrap();
    wizard.select_slot(d(10), SlotTime::hm(8, 40), &snapshot, now).unwrap();
    assert_eq!(wizard.commit_entry(now).unwrap(), WizardProgress::Continue);

    // One entry in: the continuity lock binds the second pick to Marcos.
    assert_eq!(
        wizard.select_instructor(&zoe).unwrap_err(),
        WizardError::InstructorLocked { required: marcos.id }
    );
    wizard.select_instructor(&marcos).unwrap();
    wizard.select_slot(d(10), SlotTime::hm(9, 40), &snapshot, now).unwrap();
    assert_eq!(wizard.commit_entry(now).unwrap(), WizardProgress::Continue);

    // Category advanced by itself; the lock is released at two entries.
    assert_eq!(wizard.active_category(), VehicleCategory::Motorcycle);
    wizard.select_instructor(&zoe).unwrap();
    wizard.select_slot(d(11), SlotTime::hm(8, 40), &snapshot, now).unwrap();
    let batch = match wizard.commit_entry(now).unwrap() {
        WizardProgress::Complete(batch) => batch,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(batch.len(), 3);

    // Unpaid: the batch lands provisional, invisible to other students.
    let stored = engine.submit_wizard(&wizard, true).await.unwrap();
    assert!(stored.iter().all(|b| b.provisional));
    let stranger_view = engine.day_view(marcos.id, d(10), None).await;
    assert!(stranger_view.slots.iter().all(|s| !s.taken));
    let own_view = engine.day_view(marcos.id, d(10), Some(student_id)).await;
    assert_eq!(own_view.slots.iter().filter(|s| s.taken).count(), 2);

    // Payment confirmation promotes all three in one batch.
    let promoted = engine.confirm_payment(student_id).await.unwrap();
    assert_eq!(promoted.len(), 3);
    assert!(engine.bookings_for_student(student_id).iter().all(|b| !b.provisional));

    // The instructor verifies the first car lesson with full evidence.
    let uploader = MemoryUploader::new();
    let geo = FixedGeo(GeoPoint { lat: -23.5, lng: -46.6 });
    let mut start = CaptureDraft::new();
    start.add_photo(&uploader, "odometer", vec![0xa0]).await.unwrap();
    start.add_photo(&uploader, "student", vec![0xa1]).await.unwrap();
    start.locate(&geo).await;
    let mut end = CaptureDraft::new();
    end.add_photo(&uploader, "odometer", vec![0xb0]).await.unwrap();
    end.add_photo(&uploader, "student", vec![0xb1]).await.unwrap();
    end.locate(&geo).await;
    let evidence = lectio::model::CompletionEvidence {
        start: start.finish_session_capture().unwrap(),
        end: end.finish_session_capture().unwrap(),
    };

    let first_car = engine
        .bookings_for_instructor(marcos.id, d(10))
        .into_iter()
        .next()
        .expect("first car lesson");
    engine
        .complete_lesson(
            resolve(Role::Instructor),
            first_car.id,
            evidence,
            Some("smooth clutch work".into()),
            Some(Rating::VeryGood),
        )
        .await
        .unwrap();

    // Exactly one car lesson counted; the motorcycle counter is untouched.
    let after = engine.store.get_student(&student_id).unwrap();
    assert_eq!(after.car.completed, 1);
    assert_eq!(after.car.remaining(), 1);
    assert_eq!(after.motorcycle.completed, 0);

    // One attendance mail went out with all four photo references.
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].outcome, "completed");
    assert_eq!(sent[0].photo_urls.len(), 4);
    assert!(sent[0].body().contains("mem://odometer"));
}
