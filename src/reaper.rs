use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::limits::REAPER_INTERVAL_SECS;

/// Background task that periodically purges expired provisional bookings.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(REAPER_INTERVAL_SECS));
    loop {
        interval.tick().await;
        let now = engine.now();
        let purged = engine.purge_expired_provisionals(now).await;
        if purged > 0 {
            info!(purged, "reaped expired provisional bookings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::model::{Student, VehicleCategory};
    use crate::notify::NotifyHub;
    use crate::services::NullMailer;
    use crate::slots::SlotTime;
    use chrono::{NaiveDate, TimeDelta, Utc};
    use ulid::Ulid;

    #[tokio::test]
    async fn reaper_purges_only_expired_provisionals() {
        let engine = Engine::new(
            ScheduleConfig::default(),
            Arc::new(NotifyHub::new()),
            Arc::new(NullMailer),
        );
        let student = Student::new("Ana", vec![VehicleCategory::Car]);
        let student_id = student.id;
        engine.upsert_student(student).await.unwrap();

        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut expired = crate::model::Booking::new(
            student_id,
            Ulid::new(),
            VehicleCategory::Car,
            date,
            SlotTime::hm(8, 0),
        );
        expired.provisional = true;
        expired.expires_at = Some(now - TimeDelta::seconds(1));
        let mut live = crate::model::Booking::new(
            student_id,
            Ulid::new(),
            VehicleCategory::Car,
            date,
            SlotTime::hm(9, 0),
        );
        live.provisional = true;
        live.expires_at = Some(now + TimeDelta::minutes(10));
        engine.store.insert_booking(expired.clone()).unwrap();
        engine.store.insert_booking(live.clone()).unwrap();

        assert_eq!(engine.purge_expired_provisionals(now).await, 1);
        assert!(engine.store.get_booking(&expired.id).is_none());
        assert!(engine.store.get_booking(&live.id).is_some());

        // Second pass finds nothing left.
        assert_eq!(engine.purge_expired_provisionals(now).await, 0);
    }
}
