use anyhow::Context;
use async_trait::async_trait;

use super::{render_message, NotificationSink};
use crate::models::CallSummary;

/// Texts the summary to the business's notification number.
pub struct TwilioSmsNotifier {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsNotifier {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for TwilioSmsNotifier {
    async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()> {
        let Some(to) = summary.notification.sms.as_deref() else {
            tracing::debug!(business_id = %summary.business_id, "no SMS number configured, skipping");
            return Ok(());
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let body = render_message(summary);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .context("failed to send Twilio SMS")?
            .error_for_status()
            .context("Twilio API returned error")?;

        tracing::info!(call_id = %summary.call_id, to, "call summary sent by SMS");
        Ok(())
    }
}
