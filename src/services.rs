//! Contracts for the external collaborators: evidence upload, geolocation
//! and mail dispatch. The core never talks to a network itself; embedders
//! hand it implementations of these traits.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::{AbsenceEvidence, GeoPoint, SessionCapture};
use crate::notify::AttendanceMail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Unavailable(String),
    Denied(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Unavailable(msg) => write!(f, "service unavailable: {msg}"),
            ServiceError::Denied(msg) => write!(f, "service denied: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Accepts a raw photograph; returns a durable reference.
#[async_trait]
pub trait EvidenceUploader: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String, ServiceError>;
}

/// On-demand device location. May fail if unavailable or denied.
#[async_trait]
pub trait GeoSource: Send + Sync {
    async fn current(&self) -> Result<GeoPoint, ServiceError>;
}

/// Fire-and-forget mail dispatch to the fixed operational address.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &AttendanceMail) -> Result<(), ServiceError>;
}

// ── Evidence capture ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    MissingPhotos { have: usize, need: usize },
    MissingLocation,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::MissingPhotos { have, need } => {
                write!(f, "capture has {have} of {need} required photos")
            }
            CaptureError::MissingLocation => write!(f, "capture has no geolocation"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Accumulates uploads and a location for one end of a session. A failed
/// geolocation read degrades the capture (it proceeds without coordinates)
/// but the draft cannot be finished until coordinates are present.
#[derive(Debug, Default)]
pub struct CaptureDraft {
    photos: Vec<String>,
    location: Option<GeoPoint>,
}

impl CaptureDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_photo(
        &mut self,
        uploader: &dyn EvidenceUploader,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ServiceError> {
        let url = uploader.upload(name, bytes).await?;
        self.photos.push(url);
        Ok(())
    }

    /// Try to attach the current location. Failure is tolerated here; the
    /// user keeps capturing photos and retries before finishing.
    pub async fn locate(&mut self, geo: &dyn GeoSource) {
        match geo.current().await {
            Ok(point) => self.location = Some(point),
            Err(e) => warn!("geolocation unavailable, capture continues without it: {e}"),
        }
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn finish_session_capture(self) -> Result<SessionCapture, CaptureError> {
        let location = self.location.ok_or(CaptureError::MissingLocation)?;
        let [a, b]: [String; 2] = self
            .photos
            .try_into()
            .map_err(|v: Vec<String>| CaptureError::MissingPhotos { have: v.len(), need: 2 })?;
        Ok(SessionCapture { photos: [a, b], location })
    }

    /// First photo is the responsible party, second is the location shot.
    pub fn finish_absence_evidence(
        self,
        captured_at: DateTime<Utc>,
    ) -> Result<AbsenceEvidence, CaptureError> {
        let location = self.location.ok_or(CaptureError::MissingLocation)?;
        let [responsible_photo, location_photo]: [String; 2] = self
            .photos
            .try_into()
            .map_err(|v: Vec<String>| CaptureError::MissingPhotos { have: v.len(), need: 2 })?;
        Ok(AbsenceEvidence { responsible_photo, location_photo, location, captured_at })
    }
}

// ── In-memory implementations ────────────────────────────────────
// Defaults for embedders without real services, and doubles for tests.

pub struct MemoryUploader {
    seq: AtomicUsize,
}

impl Default for MemoryUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self { seq: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EvidenceUploader for MemoryUploader {
    async fn upload(&self, name: &str, _bytes: Vec<u8>) -> Result<String, ServiceError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        Ok(format!("mem://{name}-{n}"))
    }
}

pub struct FixedGeo(pub GeoPoint);

#[async_trait]
impl GeoSource for FixedGeo {
    async fn current(&self) -> Result<GeoPoint, ServiceError> {
        Ok(self.0)
    }
}

/// Always fails, modelling a denied location permission.
pub struct DeniedGeo;

#[async_trait]
impl GeoSource for DeniedGeo {
    async fn current(&self) -> Result<GeoPoint, ServiceError> {
        Err(ServiceError::Denied("location permission denied".into()))
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<AttendanceMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<AttendanceMail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &AttendanceMail) -> Result<(), ServiceError> {
        self.sent.lock().expect("mailer mutex poisoned").push(mail.clone());
        Ok(())
    }
}

/// Drops every mail. The engine treats dispatch as fire-and-forget anyway.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, _mail: &AttendanceMail) -> Result<(), ServiceError> {
        Ok(())
    }
}
