use crate::db::DbPool;
use crate::entities::invoice::{self, InvoiceStatus, PaymentType};
use crate::entities::project::{self, ProjectStatus};
use crate::entities::quote::{self, QuoteStatus, ResponseKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    GatewayError, IntentMetadata, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest,
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Customer contact captured at response time. Falls back to the contact
/// stored on the quote when a field is absent.
#[derive(Debug, Clone, Default)]
pub struct CustomerInfo {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

/// Everything acceptance produces: the project, its down-payment invoice,
/// and the gateway handle when one was created or is already attached.
/// `payment` carries a `client_handle` only on the call that actually opened
/// the intent; replays return the stored intent id alone.
#[derive(Debug, Clone)]
pub struct AcceptanceOutcome {
    pub project: project::Model,
    pub invoice: invoice::Model,
    pub payment: Option<PaymentIntentHandle>,
}

/// Turns an accepted quote into a project with a pending down-payment
/// invoice and a gateway payment intent.
///
/// The whole operation is idempotent: the unique index on
/// `projects.quote_id` guarantees at most one project per quote, and a
/// retry after a mid-flight failure resumes from whatever step is missing
/// (detected by the invoice still having no intent id).
#[derive(Clone)]
pub struct AcceptanceService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
    invoice_due_days: i64,
}

fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("INV-{}-{}", now.format("%Y%m%d"), suffix)
}

impl AcceptanceService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        invoice_due_days: i64,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            invoice_due_days,
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to publish acceptance event");
            }
        }
    }

    /// Accept a quote and run the full acceptance pipeline. Calling this for
    /// a quote that already went through acceptance returns the existing
    /// project and invoice instead of creating anything new.
    #[instrument(skip(self, info), fields(quote_id = %quote_id))]
    pub async fn accept_quote(
        &self,
        quote_id: Uuid,
        info: CustomerInfo,
    ) -> Result<AcceptanceOutcome, ServiceError> {
        let quote = quote::Entity::find_by_id(quote_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", quote_id)))?;

        if let Some(existing) = self.find_project(quote_id).await? {
            info!(project_id = %existing.id, "Acceptance already ran for quote; resuming");
            return self.resume(&quote, existing).await;
        }

        let quote = self.ensure_accepted(quote).await?;

        let now = Utc::now();
        let project = project::Model {
            id: Uuid::new_v4(),
            quote_id: quote.id,
            name: quote.project_name.clone(),
            address: quote.project_address.clone(),
            customer_name: info
                .customer_name
                .unwrap_or_else(|| quote.customer_name.clone()),
            customer_email: info
                .customer_email
                .unwrap_or_else(|| quote.customer_email.clone()),
            budget: quote.total,
            status: ProjectStatus::Planning,
            start_date: now,
            created_at: now,
            updated_at: None,
        };

        let project_row = project::ActiveModel {
            id: Set(project.id),
            quote_id: Set(project.quote_id),
            name: Set(project.name.clone()),
            address: Set(project.address.clone()),
            customer_name: Set(project.customer_name.clone()),
            customer_email: Set(project.customer_email.clone()),
            budget: Set(project.budget),
            status: Set(project.status),
            start_date: Set(project.start_date),
            created_at: Set(project.created_at),
            updated_at: Set(None),
        };

        let txn = self.db.begin().await?;

        let inserted = project::Entity::insert(project_row)
            .on_conflict(
                OnConflict::column(project::Column::QuoteId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&txn)
            .await;

        match inserted {
            Ok(_) => {}
            Err(DbErr::RecordNotInserted) => {
                // Lost the creation race; the winner's project is authoritative.
                txn.rollback().await?;
                let existing = self.find_project(quote.id).await?.ok_or_else(|| {
                    ServiceError::AcceptanceFailed(format!(
                        "project for quote {} disappeared mid-acceptance",
                        quote.id
                    ))
                })?;
                return self.resume(&quote, existing).await;
            }
            Err(e) => return Err(e.into()),
        }

        let invoice = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(generate_invoice_number(now)),
            project_id: Set(project.id),
            quote_id: Set(quote.id),
            payment_type: Set(PaymentType::DownPayment),
            amount: Set(quote.down_payment_amount()),
            currency: Set(quote.currency.clone()),
            status: Set(InvoiceStatus::Draft),
            due_date: Set(now + chrono::Duration::days(self.invoice_due_days)),
            payment_intent_id: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            project_id = %project.id,
            invoice_id = %invoice.id,
            amount = %invoice.amount,
            "Created project and down payment invoice for accepted quote"
        );
        self.send_event(Event::ProjectCreated {
            project_id: project.id,
            quote_id: quote.id,
        })
        .await;
        self.send_event(Event::InvoiceIssued {
            invoice_id: invoice.id,
            project_id: project.id,
        })
        .await;

        self.request_and_attach_intent(&quote, project, invoice)
            .await
    }

    async fn find_project(&self, quote_id: Uuid) -> Result<Option<project::Model>, ServiceError> {
        Ok(project::Entity::find()
            .filter(project::Column::QuoteId.eq(quote_id))
            .one(&*self.db)
            .await?)
    }

    /// Drive the quote to accepted if the caller has not already done so.
    /// The conditional update is the arbiter under concurrency; whatever it
    /// reports, the reloaded row decides the outcome.
    async fn ensure_accepted(&self, quote: quote::Model) -> Result<quote::Model, ServiceError> {
        match quote.response {
            Some(ResponseKind::Accepted) => return Ok(quote),
            Some(ResponseKind::Declined) => return Err(ServiceError::AlreadyResponded),
            None => {}
        }
        if quote.status == QuoteStatus::Draft {
            return Err(ServiceError::InvalidStatus(
                "only a sent quote can be accepted".to_string(),
            ));
        }
        let now = Utc::now();
        if quote.is_expired(now) {
            return Err(ServiceError::QuoteExpired);
        }

        let won = quote::Entity::update_many()
            .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Accepted))
            .col_expr(
                quote::Column::Response,
                Expr::value(Some(ResponseKind::Accepted)),
            )
            .col_expr(quote::Column::RespondedAt, Expr::value(Some(now)))
            .col_expr(quote::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(quote::Column::Id.eq(quote.id))
            .filter(quote::Column::RespondedAt.is_null())
            .filter(quote::Column::Status.is_in([QuoteStatus::Sent, QuoteStatus::Viewed]))
            .filter(quote::Column::ValidUntil.gte(now))
            .exec(&*self.db)
            .await?;

        let reloaded = quote::Entity::find_by_id(quote.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", quote.id)))?;

        if won.rows_affected == 1 {
            info!(quote_id = %quote.id, "Quote accepted");
            self.send_event(Event::QuoteResponded {
                quote_id: quote.id,
                response: ResponseKind::Accepted.to_string(),
            })
            .await;
            return Ok(reloaded);
        }

        match reloaded.response {
            // A concurrent acceptance won; its project guard takes over from here.
            Some(ResponseKind::Accepted) => Ok(reloaded),
            Some(ResponseKind::Declined) => Err(ServiceError::AlreadyResponded),
            None if reloaded.is_expired(now) => Err(ServiceError::QuoteExpired),
            None => Err(ServiceError::InvalidOperation(
                "quote cannot be accepted in its current state".to_string(),
            )),
        }
    }

    /// Re-entry point when a project already exists: replay the finished
    /// result, or pick up at the payment-intent step if it never completed.
    async fn resume(
        &self,
        quote: &quote::Model,
        project: project::Model,
    ) -> Result<AcceptanceOutcome, ServiceError> {
        let invoice = invoice::Entity::find()
            .filter(invoice::Column::ProjectId.eq(project.id))
            .filter(invoice::Column::PaymentType.eq(PaymentType::DownPayment))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::AcceptanceFailed(format!(
                    "project {} has no down payment invoice",
                    project.id
                ))
            })?;

        match invoice.payment_intent_id.clone() {
            Some(intent_id) => Ok(AcceptanceOutcome {
                project,
                invoice,
                payment: Some(PaymentIntentHandle {
                    intent_id,
                    client_handle: None,
                }),
            }),
            None => {
                info!(
                    invoice_id = %invoice.id,
                    "Resuming acceptance at the payment intent step"
                );
                self.request_and_attach_intent(quote, project, invoice)
                    .await
            }
        }
    }

    async fn request_and_attach_intent(
        &self,
        quote: &quote::Model,
        project: project::Model,
        invoice: invoice::Model,
    ) -> Result<AcceptanceOutcome, ServiceError> {
        let request = PaymentIntentRequest {
            amount: invoice.amount,
            currency: invoice.currency.clone(),
            description: format!("Down payment for quote {}", quote.quote_number),
            metadata: IntentMetadata {
                invoice_id: invoice.id,
                quote_id: quote.id,
                payment_type: invoice.payment_type.to_string(),
            },
        };

        let handle = self
            .gateway
            .create_payment_intent(request)
            .await
            .map_err(|e| match e {
                GatewayError::Timeout => ServiceError::GatewayTimeout,
                other => {
                    ServiceError::AcceptanceFailed(format!("payment intent request failed: {}", other))
                }
            })?;

        let attached = invoice::Entity::update_many()
            .col_expr(
                invoice::Column::PaymentIntentId,
                Expr::value(Some(handle.intent_id.clone())),
            )
            .col_expr(
                invoice::Column::Status,
                Expr::value(InvoiceStatus::Pending),
            )
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::PaymentIntentId.is_null())
            .exec(&*self.db)
            .await?;

        let invoice = invoice::Entity::find_by_id(invoice.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::AcceptanceFailed(format!("invoice {} disappeared", invoice.id))
            })?;

        if attached.rows_affected == 1 {
            info!(
                invoice_id = %invoice.id,
                intent_id = %handle.intent_id,
                "Attached payment intent to invoice"
            );
            self.send_event(Event::PaymentIntentRequested {
                invoice_id: invoice.id,
                intent_id: handle.intent_id.clone(),
            })
            .await;
            return Ok(AcceptanceOutcome {
                project,
                invoice,
                payment: Some(handle),
            });
        }

        // A concurrent retry attached its intent first; ours is now orphaned
        // at the gateway and the stored one is authoritative.
        warn!(
            invoice_id = %invoice.id,
            orphaned_intent_id = %handle.intent_id,
            "Concurrent acceptance attached a different payment intent"
        );
        let payment = invoice
            .payment_intent_id
            .clone()
            .map(|intent_id| PaymentIntentHandle {
                intent_id,
                client_handle: None,
            });
        Ok(AcceptanceOutcome {
            project,
            invoice,
            payment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_carry_date_and_random_suffix() {
        let now = Utc::now();
        let number = generate_invoice_number(now);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn invoice_numbers_do_not_repeat() {
        let now = Utc::now();
        assert_ne!(generate_invoice_number(now), generate_invoice_number(now));
    }
}
