use async_trait::async_trait;

use super::CalendarProvider;
use crate::db::{queries, Db};
use crate::models::{CalendarEvent, Interval};

/// Calendar kept in the service's own SQLite database.
pub struct LocalCalendar {
    db: Db,
}

impl LocalCalendar {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CalendarProvider for LocalCalendar {
    async fn list_busy_intervals(
        &self,
        calendar_ref: &str,
        window: &Interval,
    ) -> anyhow::Result<Vec<Interval>> {
        let db = self.db.lock().unwrap();
        queries::list_busy_intervals(&db, calendar_ref, window)
    }

    async fn create_event(
        &self,
        calendar_ref: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<CalendarEvent> {
        let id = {
            let db = self.db.lock().unwrap();
            queries::insert_calendar_event(&db, calendar_ref, event)?
        };
        tracing::debug!(calendar_ref, event_id = %id, "stored local calendar event");

        let mut stored = event.clone();
        stored.id = Some(id);
        Ok(stored)
    }
}
