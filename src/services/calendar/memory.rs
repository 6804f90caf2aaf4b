use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::CalendarProvider;
use crate::models::{CalendarEvent, Interval};

/// Process-local calendar keyed by calendar reference.
#[derive(Default)]
pub struct InMemoryCalendar {
    busy: Mutex<HashMap<String, Vec<Interval>>>,
    events: Mutex<HashMap<String, Vec<CalendarEvent>>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy(self, calendar_ref: &str, intervals: Vec<Interval>) -> Self {
        self.busy
            .lock()
            .unwrap()
            .entry(calendar_ref.to_string())
            .or_default()
            .extend(intervals);
        self
    }

    pub fn events(&self, calendar_ref: &str) -> Vec<CalendarEvent> {
        self.events
            .lock()
            .unwrap()
            .get(calendar_ref)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn list_busy_intervals(
        &self,
        calendar_ref: &str,
        window: &Interval,
    ) -> anyhow::Result<Vec<Interval>> {
        let mut intervals: Vec<Interval> = self
            .busy
            .lock()
            .unwrap()
            .get(calendar_ref)
            .cloned()
            .unwrap_or_default();

        if let Some(events) = self.events.lock().unwrap().get(calendar_ref) {
            intervals.extend(events.iter().filter_map(|e| Interval::new(e.start, e.end)));
        }

        intervals.retain(|i| i.overlaps(window.start, window.end));
        Ok(intervals)
    }

    async fn create_event(
        &self,
        calendar_ref: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<CalendarEvent> {
        let mut stored = event.clone();
        stored.id = Some(uuid::Uuid::new_v4().to_string());
        self.events
            .lock()
            .unwrap()
            .entry(calendar_ref.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }
}
