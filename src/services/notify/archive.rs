use async_trait::async_trait;

use super::NotificationSink;
use crate::db::{queries, Db};
use crate::models::CallSummary;

/// Keeps every call summary in the `call_summaries` table.
pub struct SqliteArchive {
    db: Db,
}

impl SqliteArchive {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for SqliteArchive {
    async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()> {
        let db = self.db.lock().unwrap();
        queries::insert_call_summary(&db, summary)
    }
}
