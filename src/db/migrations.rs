use anyhow::Context;
use rusqlite::Connection;

/// Schema steps, applied in order and recorded by name.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_business_profiles",
        "CREATE TABLE IF NOT EXISTS business_profiles (
            business_id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    ),
    (
        "002_calendar_events",
        "CREATE TABLE IF NOT EXISTS calendar_events (
            id TEXT PRIMARY KEY,
            calendar_ref TEXT NOT NULL,
            summary TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            attendees TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_calendar_events_range
            ON calendar_events (calendar_ref, start_at, end_at);",
    ),
    (
        "003_call_summaries",
        "CREATE TABLE IF NOT EXISTS call_summaries (
            call_id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL,
            caller_number TEXT,
            duration_seconds INTEGER NOT NULL,
            action_required INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL,
            ended_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_call_summaries_business
            ON call_summaries (business_id, ended_at);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::debug!("applied migration: {name}");
    }

    Ok(())
}
