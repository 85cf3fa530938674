use crate::domain::repository::{AuditSink, Notifier};
use crate::domain::types::{AuditEvent, DeliveryOutcome, NotificationContext};

/// Log-only notifier for deployments without outbound delivery wired up.
/// The token itself is never written to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    async fn deliver(
        &self,
        recipient: &str,
        _token: &str,
        context: &NotificationContext,
    ) -> DeliveryOutcome {
        match context {
            NotificationContext::Invitation {
                invitation_id,
                role_name,
                invited_by,
                expires_at,
                ..
            } => tracing::info!(
                recipient,
                invitation_id = %invitation_id,
                role = %role_name,
                invited_by = %invited_by,
                expires_at = %expires_at,
                "invitation ready for delivery"
            ),
            NotificationContext::PasswordReset {
                account_id,
                expires_at,
            } => tracing::info!(
                recipient,
                account_id = %account_id,
                expires_at = %expires_at,
                "password reset ready for delivery"
            ),
        }
        DeliveryOutcome::Sent
    }
}

/// Audit sink that emits each event as one JSON log line under the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(target: "audit", event = %payload);
        Ok(())
    }
}
