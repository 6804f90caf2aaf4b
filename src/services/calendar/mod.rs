pub mod http;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::models::{CalendarEvent, Interval};

/// Backend that knows which times are taken and can book new events.
///
/// Closed days are an empty busy list, not an error. Returned intervals may overlap
/// or spill outside the requested window; callers normalize them.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_busy_intervals(
        &self,
        calendar_ref: &str,
        window: &Interval,
    ) -> anyhow::Result<Vec<Interval>>;

    /// Returns the stored event, with the backend's `id` filled in.
    async fn create_event(
        &self,
        calendar_ref: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<CalendarEvent>;
}
