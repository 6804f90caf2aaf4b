pub mod archive;
pub mod twilio;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::CallSummary;

/// Receives the summary of every finished call.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()>;
}

/// Writes summaries to the log; the default when nothing else is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()> {
        tracing::info!(
            call_id = %summary.call_id,
            business_id = %summary.business_id,
            duration_seconds = summary.duration_seconds,
            action_required = summary.action_required,
            actions = summary.action_items.len(),
            "call summary: {}",
            summary.summary
        );
        Ok(())
    }
}

/// Delivers to every sink, even when an earlier one fails.
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.notify(summary).await {
                failures.push(format!("{e:#}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "{} of {} notification sinks failed: {}",
                failures.len(),
                self.sinks.len(),
                failures.join("; ")
            )
        }
    }
}

/// Short text for SMS and similar channels.
pub fn render_message(summary: &CallSummary) -> String {
    let caller = summary.caller_number.as_deref().unwrap_or("unknown caller");
    let mut body = format!("Call from {caller}: {}", summary.summary);
    for item in &summary.action_items {
        body.push_str(&format!("\n- {} ({})", item.action, item.priority.as_str()));
    }
    body
}
