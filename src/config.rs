use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::VehicleCategory;
use crate::slots::SlotTime;

pub const DEFAULT_DAY_START: SlotTime = SlotTime::hm(6, 40);
pub const DEFAULT_DAY_END: SlotTime = SlotTime::hm(20, 0);
pub const DEFAULT_SLOT_MINUTES: u16 = 60;

/// Where lessons of a given category start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonLocation {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

/// The singleton configuration record: the daily time grid plus per-category
/// lesson locations. Missing fields deserialize to the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_day_start")]
    pub day_start: SlotTime,
    #[serde(default = "default_day_end")]
    pub day_end: SlotTime,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u16,
    #[serde(default)]
    pub lesson_locations: HashMap<VehicleCategory, LessonLocation>,
}

fn default_day_start() -> SlotTime {
    DEFAULT_DAY_START
}

fn default_day_end() -> SlotTime {
    DEFAULT_DAY_END
}

fn default_slot_minutes() -> u16 {
    DEFAULT_SLOT_MINUTES
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            day_start: DEFAULT_DAY_START,
            day_end: DEFAULT_DAY_END,
            slot_minutes: DEFAULT_SLOT_MINUTES,
            lesson_locations: HashMap::new(),
        }
    }
}

impl ScheduleConfig {
    /// Returns a copy with the time grid restored to defaults if the stored
    /// values cannot produce a valid grid.
    pub fn sanitized(&self) -> Self {
        let mut c = self.clone();
        if c.slot_minutes == 0 || c.day_start >= c.day_end {
            c.day_start = DEFAULT_DAY_START;
            c.day_end = DEFAULT_DAY_END;
            c.slot_minutes = DEFAULT_SLOT_MINUTES;
        }
        c
    }

    /// Parse the configuration record from its stored JSON form. Anything
    /// unparseable falls back to the defaults rather than erroring.
    pub fn from_json(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}
