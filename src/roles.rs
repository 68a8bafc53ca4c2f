//! Role resolution. Each session resolves its role once into an immutable
//! capability set that is passed by value to the engine's gated operations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Secretary,
    Director,
}

/// What a session is allowed to do. Resolved once per session, never
/// recomputed from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Create, edit and delete bookings on behalf of students.
    pub manage_bookings: bool,
    /// Delete a booking even inside the freeze window.
    pub delete_in_freeze: bool,
    /// Record completion/absence outcomes with evidence.
    pub verify_attendance: bool,
    /// See every student's bookings, not only one's own.
    pub view_all: bool,
}

pub fn resolve(role: Role) -> Capabilities {
    match role {
        Role::Student => Capabilities::default(),
        Role::Instructor => Capabilities {
            verify_attendance: true,
            view_all: true,
            ..Capabilities::default()
        },
        Role::Secretary => Capabilities {
            manage_bookings: true,
            verify_attendance: true,
            view_all: true,
            ..Capabilities::default()
        },
        Role::Director => Capabilities {
            manage_bookings: true,
            delete_in_freeze: true,
            verify_attendance: true,
            view_all: true,
        },
    }
}
