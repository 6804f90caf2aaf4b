use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::CalendarProvider;
use crate::models::{CalendarEvent, Interval};

/// Client for a calendar microservice that fronts Google, Outlook or CalDAV.
pub struct HttpCalendar {
    url: String,
    client: reqwest::Client,
}

impl HttpCalendar {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct BusyResponse {
    #[serde(default)]
    busy: Vec<RawInterval>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: chrono::NaiveDateTime,
    end: chrono::NaiveDateTime,
}

#[async_trait]
impl CalendarProvider for HttpCalendar {
    async fn list_busy_intervals(
        &self,
        calendar_ref: &str,
        window: &Interval,
    ) -> anyhow::Result<Vec<Interval>> {
        let body = json!({
            "calendar": calendar_ref,
            "start": window.start,
            "end": window.end,
        });

        let resp = self
            .client
            .post(format!("{}/api/busy", self.url))
            .json(&body)
            .send()
            .await
            .context("failed to call calendar service")?
            .error_for_status()
            .context("calendar service returned error")?;

        let data: BusyResponse = resp
            .json()
            .await
            .context("failed to parse busy intervals")?;

        // Zero-length or inverted entries are dropped here; overlap is left to the caller.
        Ok(data
            .busy
            .into_iter()
            .filter_map(|r| Interval::new(r.start, r.end))
            .collect())
    }

    async fn create_event(
        &self,
        calendar_ref: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<CalendarEvent> {
        let body = json!({
            "calendar": calendar_ref,
            "event": event,
        });

        let resp = self
            .client
            .post(format!("{}/api/events", self.url))
            .json(&body)
            .send()
            .await
            .context("failed to call calendar service")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("calendar service error ({status}): {detail}");
        }

        resp.json::<CalendarEvent>()
            .await
            .context("failed to parse created event")
    }
}
