//! Lesson booking and attendance core for a driving school.
//!
//! The crate is embedded in-process: the host resolves a session's role
//! into [`roles::Capabilities`], drives the guided flow through
//! [`engine::BookingWizard`], and calls the [`engine::Engine`] for every
//! read and write. Provisional reservations expire on a lease; spawn
//! [`reaper::run_reaper`] to purge them in the background.

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod roles;
pub mod services;
pub mod slots;
pub mod store;
