use crate::db::DbPool;
use crate::entities::invoice::{self, InvoiceStatus, PaymentType};
use crate::entities::project::{self, ProjectStatus};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectView {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub name: String,
    pub address: String,
    pub customer_name: String,
    pub customer_email: String,
    pub budget: Decimal,
    #[schema(value_type = String, example = "planning")]
    pub status: ProjectStatus,
    pub start_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<project::Model> for ProjectView {
    fn from(project: project::Model) -> Self {
        Self {
            id: project.id,
            quote_id: project.quote_id,
            name: project.name,
            address: project.address,
            customer_name: project.customer_name,
            customer_email: project.customer_email,
            budget: project.budget,
            status: project.status,
            start_date: project.start_date,
            created_at: project.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvoiceView {
    pub id: Uuid,
    pub invoice_number: String,
    pub project_id: Uuid,
    pub quote_id: Uuid,
    #[schema(value_type = String, example = "down_payment")]
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    #[schema(value_type = String, example = "pending")]
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<invoice::Model> for InvoiceView {
    fn from(invoice: invoice::Model) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            project_id: invoice.project_id,
            quote_id: invoice.quote_id,
            payment_type: invoice.payment_type,
            amount: invoice.amount,
            currency: invoice.currency,
            status: invoice.status,
            due_date: invoice.due_date,
            payment_intent_id: invoice.payment_intent_id,
            paid_at: invoice.paid_at,
            created_at: invoice.created_at,
        }
    }
}

/// Read side for projects provisioned by quote acceptance.
#[derive(Clone)]
pub struct ProjectService {
    db: Arc<DbPool>,
}

impl ProjectService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Lists projects, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_projects(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProjectView>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = project::Entity::find()
            .order_by_desc(project::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let projects = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((projects.into_iter().map(ProjectView::from).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn get_project(&self, project_id: Uuid) -> Result<ProjectView, ServiceError> {
        let project = project::Entity::find_by_id(project_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Project {} not found", project_id)))?;
        Ok(ProjectView::from(project))
    }

    /// Invoices for one project, in issue order.
    #[instrument(skip(self))]
    pub async fn list_project_invoices(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<InvoiceView>, ServiceError> {
        let exists = project::Entity::find_by_id(project_id)
            .one(&*self.db)
            .await?
            .is_some();
        if !exists {
            return Err(ServiceError::NotFound(format!(
                "Project {} not found",
                project_id
            )));
        }
        let invoices = invoice::Entity::find()
            .filter(invoice::Column::ProjectId.eq(project_id))
            .order_by_asc(invoice::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(invoices.into_iter().map(InvoiceView::from).collect())
    }
}
