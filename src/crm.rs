//! Lead handoff to the CRM.
//!
//! Completed questionnaires become Bitrix24 deals through an incoming
//! webhook (`crm.deal.add`), as do contact details a web visitor leaves
//! when starting the chat. Without a webhook both are only logged.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::conversation::{ContactDetails, LeadSummary, UserId};
use crate::error::NotifierError;

/// Receives completed-questionnaire summaries and early contact details.
#[async_trait]
pub trait LeadNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, summary: &LeadSummary) -> Result<(), NotifierError>;

    async fn notify_contact(
        &self,
        user: &UserId,
        contact: &ContactDetails,
    ) -> Result<(), NotifierError>;
}

fn fields(title: String, comments: &impl serde::Serialize) -> Result<serde_json::Value, NotifierError> {
    Ok(serde_json::json!({
        "fields": {
            "TITLE": title,
            "COMMENTS": serde_json::to_string(comments)?,
        }
    }))
}

/// Build the `crm.deal.add` request body.
pub fn deal_payload(summary: &LeadSummary) -> Result<serde_json::Value, NotifierError> {
    fields(summary.title(), &summary.comments())
}

/// Build the `crm.deal.add` request body for bare contact details.
pub fn contact_payload(contact: &ContactDetails) -> Result<serde_json::Value, NotifierError> {
    fields(contact.title(), contact)
}

/// Posts deals to a Bitrix24 incoming webhook.
pub struct Bitrix24Notifier {
    webhook_url: SecretString,
    client: reqwest::Client,
}

impl Bitrix24Notifier {
    pub fn new(webhook_url: SecretString) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Post a deal body; the response text is returned on success.
    async fn add_deal(&self, body: &serde_json::Value) -> Result<String, NotifierError> {
        let resp = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| NotifierError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl LeadNotifier for Bitrix24Notifier {
    fn name(&self) -> &str {
        "bitrix24"
    }

    async fn notify(&self, summary: &LeadSummary) -> Result<(), NotifierError> {
        let text = self.add_deal(&deal_payload(summary)?).await?;
        tracing::info!(user = %summary.user, response = %text, "Bitrix24 deal created");
        Ok(())
    }

    async fn notify_contact(
        &self,
        user: &UserId,
        contact: &ContactDetails,
    ) -> Result<(), NotifierError> {
        let text = self.add_deal(&contact_payload(contact)?).await?;
        tracing::info!(user = %user, response = %text, "Bitrix24 contact deal created");
        Ok(())
    }
}

/// Logs the summary instead of calling a CRM.
pub struct LogNotifier;

#[async_trait]
impl LeadNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, summary: &LeadSummary) -> Result<(), NotifierError> {
        tracing::info!(
            user = %summary.user,
            segment = %summary.segment,
            title = %summary.title(),
            comments = %summary.comments(),
            "Lead captured (no CRM webhook configured)"
        );
        Ok(())
    }

    async fn notify_contact(
        &self,
        user: &UserId,
        contact: &ContactDetails,
    ) -> Result<(), NotifierError> {
        tracing::info!(
            user = %user,
            title = %contact.title(),
            name = ?contact.name,
            email = ?contact.email,
            phone = ?contact.phone,
            "Contact captured (no CRM webhook configured)"
        );
        Ok(())
    }
}
