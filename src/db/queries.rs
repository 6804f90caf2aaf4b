use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::models::{Attendee, CalendarEvent, CallSummary, Interval};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("bad timestamp '{raw}' in database: {e}"))
}

// ── Business profiles ──

pub fn get_profile_document(conn: &Connection, business_id: &str) -> anyhow::Result<Option<String>> {
    let result = conn.query_row(
        "SELECT document FROM business_profiles WHERE business_id = ?1",
        params![business_id],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(doc) => Ok(Some(doc)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert_profile_document(
    conn: &Connection,
    business_id: &str,
    document: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO business_profiles (business_id, document, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(business_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
        params![business_id, document],
    )?;
    Ok(())
}

// ── Calendar events ──

pub fn insert_calendar_event(
    conn: &Connection,
    calendar_ref: &str,
    event: &CalendarEvent,
) -> anyhow::Result<String> {
    let id = event
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let attendees = serde_json::to_string(&event.attendees)?;

    conn.execute(
        "INSERT INTO calendar_events (id, calendar_ref, summary, description, start_at, end_at, attendees)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            calendar_ref,
            event.summary,
            event.description,
            format_ts(&event.start),
            format_ts(&event.end),
            attendees,
        ],
    )?;
    Ok(id)
}

/// Intervals of events on `calendar_ref` that overlap `window`.
pub fn list_busy_intervals(
    conn: &Connection,
    calendar_ref: &str,
    window: &Interval,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_at, end_at FROM calendar_events
         WHERE calendar_ref = ?1 AND start_at < ?3 AND end_at > ?2
         ORDER BY start_at ASC",
    )?;

    let rows = stmt.query_map(
        params![calendar_ref, format_ts(&window.start), format_ts(&window.end)],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut intervals = vec![];
    for row in rows {
        let (start, end) = row?;
        if let Some(interval) = Interval::new(parse_ts(&start)?, parse_ts(&end)?) {
            intervals.push(interval);
        }
    }
    Ok(intervals)
}

pub fn get_calendar_events(conn: &Connection, calendar_ref: &str) -> anyhow::Result<Vec<CalendarEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, summary, description, start_at, end_at, attendees FROM calendar_events
         WHERE calendar_ref = ?1 ORDER BY start_at ASC",
    )?;

    let rows = stmt.query_map(params![calendar_ref], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut events = vec![];
    for row in rows {
        let (id, summary, description, start, end, attendees) = row?;
        let attendees: Vec<Attendee> = serde_json::from_str(&attendees).unwrap_or_default();
        events.push(CalendarEvent {
            id: Some(id),
            summary,
            description,
            start: parse_ts(&start)?,
            end: parse_ts(&end)?,
            attendees,
        });
    }
    Ok(events)
}

// ── Call summaries ──

pub fn insert_call_summary(conn: &Connection, summary: &CallSummary) -> anyhow::Result<()> {
    let data = serde_json::to_string(summary)?;
    conn.execute(
        "INSERT OR REPLACE INTO call_summaries (call_id, business_id, caller_number, duration_seconds, action_required, data, ended_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            summary.call_id,
            summary.business_id,
            summary.caller_number,
            summary.duration_seconds as i64,
            summary.action_required,
            data,
            format_ts(&summary.ended_at),
        ],
    )?;
    Ok(())
}

pub fn get_call_summary(conn: &Connection, call_id: &str) -> anyhow::Result<Option<CallSummary>> {
    let result = conn.query_row(
        "SELECT data FROM call_summaries WHERE call_id = ?1",
        params![call_id],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_action_required(conn: &Connection, business_id: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM call_summaries WHERE business_id = ?1 AND action_required = 1",
        params![business_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
