use crate::db::DbPool;
use crate::entities::invoice::{self, InvoiceStatus, PaymentType};
use crate::entities::payment_record;
use crate::entities::project;
use crate::entities::quote::{self, QuoteStatus, ResponseKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::notifications::NotificationSender;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A payment result as reported by the gateway, stripped of its transport
/// envelope by the webhook handler.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub intent_id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// First sighting of this intent id; the payment was recorded.
    Applied,
    /// The intent id was already recorded; nothing was re-applied.
    Deduplicated,
    /// Not a successful payment, or no matching invoice. Acknowledged and
    /// dropped so the gateway stops retrying.
    Ignored,
}

/// Applies asynchronous payment results exactly once.
///
/// The unique index on `payment_records.external_intent_id` is the
/// idempotency anchor: a redelivered notification fails its insert and is
/// treated as already processed, whatever order deliveries arrive in.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    notifier: Arc<dyn NotificationSender>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DbPool>,
        notifier: Arc<dyn NotificationSender>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            notifier,
            event_sender,
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish reconciliation event: {}", e);
            }
        }
    }

    /// Processes one gateway notification.
    ///
    /// Financial state (payment record plus invoice transition) commits in
    /// one transaction before any side effect fires, so a crash between the
    /// two leaves a retryable, never a double-applied, delivery.
    #[instrument(skip(self, notification), fields(intent_id = %notification.intent_id))]
    pub async fn handle_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        if notification.status != "succeeded" {
            debug!(
                status = %notification.status,
                "Ignoring non-success payment notification"
            );
            metrics::counter!("buildflow_payments.notifications_ignored", 1);
            return Ok(ReconciliationOutcome::Ignored);
        }

        let Some(invoice) = invoice::Entity::find_by_id(notification.invoice_id)
            .one(&*self.db)
            .await?
        else {
            warn!(
                invoice_id = %notification.invoice_id,
                "Payment notification references an unknown invoice"
            );
            metrics::counter!("buildflow_payments.notifications_ignored", 1);
            return Ok(ReconciliationOutcome::Ignored);
        };

        if notification.amount != invoice.amount {
            // Recorded as reported; the discrepancy is for the operator.
            warn!(
                invoice_id = %invoice.id,
                expected = %invoice.amount,
                reported = %notification.amount,
                "Payment amount differs from the invoice amount"
            );
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let record = payment_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice.id),
            external_intent_id: Set(notification.intent_id.clone()),
            amount: Set(notification.amount),
            currency: Set(notification
                .currency
                .clone()
                .unwrap_or_else(|| invoice.currency.clone())),
            method: Set(notification.method.clone()),
            received_at: Set(now),
            created_at: Set(now),
        };
        match payment_record::Entity::insert(record)
            .on_conflict(
                OnConflict::column(payment_record::Column::ExternalIntentId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&txn)
            .await
        {
            Ok(_) => {}
            Err(DbErr::RecordNotInserted) => {
                // Redelivery. The first processing applied the effects.
                txn.rollback().await?;
                info!(invoice_id = %invoice.id, "Duplicate payment notification deduplicated");
                metrics::counter!("buildflow_payments.notifications_deduplicated", 1);
                self.finalize_quote(invoice.quote_id).await?;
                return Ok(ReconciliationOutcome::Deduplicated);
            }
            Err(e) => return Err(e.into()),
        }

        let flipped = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Paid))
            .col_expr(invoice::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.is_in([
                InvoiceStatus::Draft,
                InvoiceStatus::Pending,
                InvoiceStatus::Overdue,
            ]))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(
            invoice_id = %invoice.id,
            amount = %notification.amount,
            "Payment recorded"
        );
        metrics::counter!("buildflow_payments.recorded", 1);
        self.send_event(Event::PaymentRecorded {
            invoice_id: invoice.id,
            external_intent_id: notification.intent_id.clone(),
        })
        .await;

        let became_paid = flipped.rows_affected == 1;
        if became_paid {
            info!(invoice_id = %invoice.id, "Invoice paid");
            metrics::counter!("buildflow_invoices.paid", 1);
            self.send_event(Event::InvoicePaid(invoice.id)).await;
        } else {
            warn!(
                invoice_id = %invoice.id,
                status = %invoice.status,
                "Payment recorded against an invoice that was no longer payable"
            );
        }

        if became_paid && invoice.payment_type == PaymentType::DownPayment {
            self.send_welcome(&invoice).await;
        }

        self.finalize_quote(invoice.quote_id).await?;
        Ok(ReconciliationOutcome::Applied)
    }

    /// Settled money is the strongest acceptance signal: flows where the
    /// accept click only starts payment still end with the quote accepted.
    /// No-ops once any response is on record.
    async fn finalize_quote(&self, quote_id: Uuid) -> Result<(), ServiceError> {
        let now = Utc::now();
        let finalized = quote::Entity::update_many()
            .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Accepted))
            .col_expr(
                quote::Column::Response,
                Expr::value(Some(ResponseKind::Accepted)),
            )
            .col_expr(quote::Column::RespondedAt, Expr::value(Some(now)))
            .col_expr(quote::Column::UpdatedAt, Expr::value(now))
            .filter(quote::Column::Id.eq(quote_id))
            .filter(quote::Column::RespondedAt.is_null())
            .exec(&*self.db)
            .await?;
        if finalized.rows_affected == 1 {
            info!(quote_id = %quote_id, "Quote finalized as accepted by settled payment");
            metrics::counter!("buildflow_quotes.finalized_by_payment", 1);
        }
        Ok(())
    }

    async fn send_welcome(&self, invoice: &invoice::Model) {
        let project = match project::Entity::find_by_id(invoice.project_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(project)) => project,
            Ok(None) => {
                warn!(
                    project_id = %invoice.project_id,
                    "Paid invoice references a missing project"
                );
                return;
            }
            Err(e) => {
                warn!("Could not load project for welcome notification: {}", e);
                return;
            }
        };

        // Fire-and-forget from here: the payment is already committed.
        if let Err(e) = self
            .notifier
            .send_project_welcome(project.id, &project.customer_email)
            .await
        {
            warn!(project_id = %project.id, "Welcome notification failed: {}", e);
            return;
        }
        info!(project_id = %project.id, "Welcome notification sent");
        metrics::counter!("buildflow_projects.welcomes_sent", 1);
        self.send_event(Event::WelcomeNotificationQueued {
            project_id: project.id,
        })
        .await;
    }
}
