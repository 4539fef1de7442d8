use crate::errors::ServiceError;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Outbound customer notifications. Delivery is fire-and-forget from the
/// caller's point of view: reconciliation commits financial state first and
/// only logs a failed send.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_project_welcome(
        &self,
        project_id: Uuid,
        customer_email: &str,
    ) -> Result<(), ServiceError>;
}

/// Default sender: writes the notification to the log. The real mail or
/// messaging integration plugs in behind the same trait.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send_project_welcome(
        &self,
        project_id: Uuid,
        customer_email: &str,
    ) -> Result<(), ServiceError> {
        info!(
            project_id = %project_id,
            customer_email = %customer_email,
            "Sending project welcome notification"
        );
        Ok(())
    }
}
