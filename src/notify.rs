use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Booking, BookingEvent, EvidenceBundle, GeoPoint, VehicleCategory};
use crate::slots::SlotTime;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-instructor calendar watchers.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<BookingEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to booking events for one instructor's calendar. Creates
    /// the channel if needed.
    pub fn subscribe(&self, instructor_id: Ulid) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(instructor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, instructor_id: Ulid, event: &BookingEvent) {
        if let Some(sender) = self.channels.get(&instructor_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when an instructor is deactivated).
    pub fn remove(&self, instructor_id: &Ulid) {
        self.channels.remove(instructor_id);
    }
}

/// Summary of a verified outcome, dispatched to the fixed operational
/// address after a completion or absence is recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceMail {
    pub booking_id: Ulid,
    pub outcome: String,
    pub student: String,
    pub instructor: String,
    pub category: VehicleCategory,
    pub date: NaiveDate,
    pub slot: SlotTime,
    pub photo_urls: Vec<String>,
    pub locations: Vec<GeoPoint>,
    pub sent_at: DateTime<Utc>,
}

impl AttendanceMail {
    pub fn from_outcome(
        booking: &Booking,
        student_name: &str,
        instructor_name: &str,
        evidence: &EvidenceBundle,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let outcome = match evidence {
            EvidenceBundle::Completion(_) => "completed",
            EvidenceBundle::Absence(_) => "absent",
        };
        Self {
            booking_id: booking.id,
            outcome: outcome.to_string(),
            student: student_name.to_string(),
            instructor: instructor_name.to_string(),
            category: booking.category,
            date: booking.date,
            slot: booking.slot,
            photo_urls: evidence.photo_urls(),
            locations: evidence.locations(),
            sent_at,
        }
    }

    /// Rendered body for the mail service.
    pub fn body(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookingStatus;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let instructor = Ulid::new();
        let mut rx = hub.subscribe(instructor);

        let event = BookingEvent::StatusChanged {
            id: Ulid::new(),
            instructor_id: instructor,
            status: BookingStatus::Completed,
        };
        hub.send(instructor, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let instructor = Ulid::new();
        // No subscriber — should not panic
        hub.send(
            instructor,
            &BookingEvent::Deleted { id: Ulid::new(), instructor_id: instructor },
        );
    }

    #[test]
    fn mail_carries_all_evidence() {
        use crate::model::{CompletionEvidence, SessionCapture};
        use chrono::NaiveDate;

        let booking = Booking::new(
            Ulid::new(),
            Ulid::new(),
            VehicleCategory::Car,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            SlotTime::hm(14, 0),
        );
        let capture = |tag: &str| SessionCapture {
            photos: [format!("mem://{tag}-a"), format!("mem://{tag}-b")],
            location: GeoPoint { lat: -23.5, lng: -46.6 },
        };
        let evidence = EvidenceBundle::Completion(CompletionEvidence {
            start: capture("start"),
            end: capture("end"),
        });

        let mail = AttendanceMail::from_outcome(&booking, "Ana", "Marcos", &evidence, Utc::now());
        assert_eq!(mail.outcome, "completed");
        assert_eq!(mail.photo_urls.len(), 4);
        assert_eq!(mail.locations.len(), 2);
        assert!(mail.body().contains("mem://start-a"));
    }
}
