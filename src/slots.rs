use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::ScheduleConfig;

/// Time-of-day slot label, stored as minutes since midnight.
/// Renders and parses as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(u16);

impl SlotTime {
    pub const fn from_minutes(minutes: u16) -> Self {
        Self(minutes)
    }

    pub const fn hm(hour: u16, minute: u16) -> Self {
        Self(hour * 60 + minute)
    }

    pub const fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSlotError(String);

impl fmt::Display for ParseSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid slot time {:?}: expected \"HH:MM\"", self.0)
    }
}

impl std::error::Error for ParseSlotError {}

impl FromStr for SlotTime {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseSlotError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(bad)?;
        let h: u16 = h.parse().map_err(|_| bad())?;
        let m: u16 = m.parse().map_err(|_| bad())?;
        if h >= 24 || m >= 60 {
            return Err(bad());
        }
        Ok(SlotTime::hm(h, m))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lazy, finite sequence of slot labels: starts at day_start, steps by
/// slot_minutes, stops before day_end. `Clone` makes it restartable.
#[derive(Debug, Clone)]
pub struct SlotSequence {
    next: u16,
    end: u16,
    step: u16,
}

impl Iterator for SlotSequence {
    type Item = SlotTime;

    fn next(&mut self) -> Option<SlotTime> {
        if self.next >= self.end {
            return None;
        }
        let slot = SlotTime(self.next);
        self.next = self.next.saturating_add(self.step);
        Some(slot)
    }
}

/// Build the daily slot grid from configuration. Malformed configuration
/// (start >= end, zero step) is replaced by the documented defaults before
/// the sequence is built.
pub fn slot_sequence(config: &ScheduleConfig) -> SlotSequence {
    let c = config.sanitized();
    SlotSequence {
        next: c.day_start.minutes(),
        end: c.day_end.minutes(),
        step: c.slot_minutes,
    }
}

/// Number of slots in the daily grid, without materializing the sequence.
pub fn slot_count(config: &ScheduleConfig) -> usize {
    let c = config.sanitized();
    let window = c.day_end.minutes().saturating_sub(c.day_start.minutes());
    window.div_ceil(c.slot_minutes) as usize
}
