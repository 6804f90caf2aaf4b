use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Half-open time range `[start, end)` in business-local time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start < self.end && end > self.start
    }

    /// Restricts the interval to `[lo, hi)`; `None` if nothing (or nothing valid) remains.
    pub fn clip(&self, lo: NaiveDateTime, hi: NaiveDateTime) -> Option<Self> {
        Self::new(self.start.max(lo), self.end.min(hi))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: u32,
}

impl Slot {
    pub fn new(start: NaiveDateTime, duration_minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(duration_minutes)),
            duration_minutes,
        }
    }

    /// Spoken form, e.g. "Monday, June 16 at 9:00 AM".
    pub fn describe(&self) -> String {
        self.start.format("%A, %B %-d at %-I:%M %p").to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attendee {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingResult {
    pub event_id: String,
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallerDetails {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}
