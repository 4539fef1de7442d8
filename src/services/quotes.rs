use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::access_token::TokenKind;
use crate::entities::quote::{self, PaymentSchedule, QuoteStatus, ResponseKind};
use crate::entities::quote_line_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::acceptance::{AcceptanceOutcome, AcceptanceService, CustomerInfo};
use crate::services::tokens::TokenService;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One line of work on a quote, as submitted by the office.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemInput {
    #[validate(length(min = 1, max = 120))]
    pub category: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

fn default_down_payment_pct() -> Decimal {
    dec!(40)
}

fn default_milestone_pct() -> Decimal {
    dec!(40)
}

fn default_final_pct() -> Decimal {
    dec!(20)
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateQuoteRequest {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1, max = 200))]
    pub project_name: String,
    #[validate(length(min = 1, max = 400))]
    pub project_address: String,
    #[validate(length(min = 1, message = "at least one line item is required"))]
    pub line_items: Vec<LineItemInput>,
    /// Percentage applied to the subtotal. Omitted means untaxed.
    pub tax_rate: Option<Decimal>,
    #[serde(default = "default_down_payment_pct")]
    pub down_payment_pct: Decimal,
    #[serde(default = "default_milestone_pct")]
    pub milestone_pct: Decimal,
    #[serde(default = "default_final_pct")]
    pub final_pct: Decimal,
    /// Defaults to the configured validity window when omitted.
    pub valid_until: Option<DateTime<Utc>>,
    /// ISO 4217 code. Defaults to the configured currency.
    pub currency: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineItemView {
    pub id: Uuid,
    pub category: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub position: i32,
}

impl From<quote_line_item::Model> for LineItemView {
    fn from(item: quote_line_item::Model) -> Self {
        Self {
            id: item.id,
            category: item.category,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
            position: item.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentScheduleView {
    pub down_payment: Decimal,
    pub milestone: Decimal,
    pub final_payment: Decimal,
}

impl From<PaymentSchedule> for PaymentScheduleView {
    fn from(schedule: PaymentSchedule) -> Self {
        Self {
            down_payment: schedule.down_payment,
            milestone: schedule.milestone,
            final_payment: schedule.final_payment,
        }
    }
}

/// Full quote as returned to both the office and the customer link.
///
/// `status` is the effective status: an open quote past its deadline reads
/// as `expired` here even though the row still says `sent` or `viewed`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuoteDetail {
    pub id: Uuid,
    pub quote_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub project_name: String,
    pub project_address: String,
    #[schema(value_type = String, example = "sent")]
    pub status: QuoteStatus,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub down_payment_pct: Decimal,
    pub milestone_pct: Decimal,
    pub final_pct: Decimal,
    pub payment_schedule: PaymentScheduleView,
    pub valid_until: DateTime<Utc>,
    #[schema(value_type = Option<String>, example = "accepted")]
    pub response: Option<ResponseKind>,
    pub response_notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub line_items: Vec<LineItemView>,
}

impl QuoteDetail {
    fn from_parts(
        quote: quote::Model,
        items: Vec<quote_line_item::Model>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: quote.id,
            quote_number: quote.quote_number.clone(),
            customer_name: quote.customer_name.clone(),
            customer_email: quote.customer_email.clone(),
            project_name: quote.project_name.clone(),
            project_address: quote.project_address.clone(),
            status: quote.effective_status(now),
            subtotal: quote.subtotal,
            tax_rate: quote.tax_rate,
            tax_amount: quote.tax_amount,
            total: quote.total,
            currency: quote.currency.clone(),
            down_payment_pct: quote.down_payment_pct,
            milestone_pct: quote.milestone_pct,
            final_pct: quote.final_pct,
            payment_schedule: quote.payment_schedule().into(),
            valid_until: quote.valid_until,
            response: quote.response,
            response_notes: quote.response_notes.clone(),
            responded_at: quote.responded_at,
            first_viewed_at: quote.first_viewed_at,
            last_viewed_at: quote.last_viewed_at,
            notes: quote.notes,
            created_at: quote.created_at,
            line_items: items.into_iter().map(LineItemView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuoteSummary {
    pub id: Uuid,
    pub quote_number: String,
    pub customer_name: String,
    pub project_name: String,
    #[schema(value_type = String, example = "sent")]
    pub status: QuoteStatus,
    pub total: Decimal,
    pub currency: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl QuoteSummary {
    fn from_model(quote: quote::Model, now: DateTime<Utc>) -> Self {
        let status = quote.effective_status(now);
        Self {
            id: quote.id,
            quote_number: quote.quote_number,
            customer_name: quote.customer_name,
            project_name: quote.project_name,
            status,
            total: quote.total,
            currency: quote.currency,
            valid_until: quote.valid_until,
            created_at: quote.created_at,
        }
    }
}

/// Outcome of sending a quote. The cleartext token appears here exactly
/// once; only its hash is stored.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SendQuoteResponse {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// What a customer response produced.
#[derive(Debug)]
pub enum RespondOutcome {
    Accepted {
        quote: QuoteDetail,
        acceptance: AcceptanceOutcome,
    },
    Declined {
        quote: QuoteDetail,
    },
}

#[derive(Clone)]
pub struct QuoteService {
    db: Arc<DbPool>,
    tokens: TokenService,
    acceptance: AcceptanceService,
    event_sender: Option<Arc<EventSender>>,
    public_base_url: String,
    default_valid_days: i64,
    default_currency: String,
}

impl QuoteService {
    pub fn new(
        db: Arc<DbPool>,
        tokens: TokenService,
        acceptance: AcceptanceService,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            tokens,
            acceptance,
            event_sender,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            default_valid_days: config.default_quote_valid_days,
            default_currency: config.default_currency.clone(),
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish quote event: {}", e);
            }
        }
    }

    /// Creates a draft quote with computed totals.
    #[instrument(skip(self, request), fields(project = %request.project_name))]
    pub async fn create_quote(
        &self,
        request: CreateQuoteRequest,
    ) -> Result<QuoteDetail, ServiceError> {
        request.validate()?;
        validate_financials(&request)?;

        let now = Utc::now();
        let valid_until = request
            .valid_until
            .unwrap_or_else(|| now + Duration::days(self.default_valid_days));
        if valid_until <= now {
            return Err(ServiceError::ValidationError(
                "valid_until must be in the future".to_string(),
            ));
        }
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());
        let tax_rate = request.tax_rate.unwrap_or(Decimal::ZERO);

        let mut subtotal = Decimal::ZERO;
        let mut line_totals = Vec::with_capacity(request.line_items.len());
        for item in &request.line_items {
            let line_total = round_money(item.quantity * item.unit_price);
            subtotal += line_total;
            line_totals.push(line_total);
        }
        let tax_amount = quote::share_of(subtotal, tax_rate);
        let total = subtotal + tax_amount;

        let quote_id = Uuid::new_v4();
        let quote_row = quote::ActiveModel {
            id: Set(quote_id),
            quote_number: Set(generate_quote_number()),
            customer_name: Set(request.customer_name.clone()),
            customer_email: Set(request.customer_email.clone()),
            project_name: Set(request.project_name.clone()),
            project_address: Set(request.project_address.clone()),
            status: Set(QuoteStatus::Draft),
            subtotal: Set(subtotal),
            tax_rate: Set(tax_rate),
            tax_amount: Set(tax_amount),
            total: Set(total),
            currency: Set(currency),
            down_payment_pct: Set(request.down_payment_pct),
            milestone_pct: Set(request.milestone_pct),
            final_pct: Set(request.final_pct),
            valid_until: Set(valid_until),
            response: Set(None),
            response_notes: Set(None),
            responded_at: Set(None),
            first_viewed_at: Set(None),
            last_viewed_at: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let txn = self.db.begin().await?;
        let quote = quote_row.insert(&txn).await?;
        let mut items = Vec::with_capacity(request.line_items.len());
        for (idx, (input, line_total)) in request
            .line_items
            .iter()
            .zip(line_totals.into_iter())
            .enumerate()
        {
            let item = quote_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                quote_id: Set(quote_id),
                category: Set(input.category.clone()),
                description: Set(input.description.clone()),
                quantity: Set(input.quantity),
                unit_price: Set(input.unit_price),
                line_total: Set(line_total),
                position: Set(idx as i32),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }
        txn.commit().await?;

        info!(
            quote_id = %quote.id,
            quote_number = %quote.quote_number,
            total = %quote.total,
            "Quote created"
        );
        metrics::counter!("buildflow_quotes.created", 1);
        self.send_event(Event::QuoteCreated(quote.id)).await;

        Ok(QuoteDetail::from_parts(quote, items, now))
    }

    /// Lists quotes, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_quotes(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<QuoteSummary>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = quote::Entity::find()
            .order_by_desc(quote::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let quotes = paginator.fetch_page(page.saturating_sub(1)).await?;

        let now = Utc::now();
        Ok((
            quotes
                .into_iter()
                .map(|q| QuoteSummary::from_model(q, now))
                .collect(),
            total,
        ))
    }

    #[instrument(skip(self))]
    pub async fn get_quote(&self, quote_id: Uuid) -> Result<QuoteDetail, ServiceError> {
        let quote = self.load_quote(quote_id).await?;
        self.load_detail(quote).await
    }

    /// Marks a quote sent and issues a fresh single-use access link.
    ///
    /// Re-sending an already sent or viewed quote is allowed and rotates the
    /// link: the previous token is retired when the new one is issued.
    #[instrument(skip(self))]
    pub async fn send_quote(&self, quote_id: Uuid) -> Result<SendQuoteResponse, ServiceError> {
        let quote = self.load_quote(quote_id).await?;
        let now = Utc::now();

        if quote.status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "quote is already {}",
                quote.status
            )));
        }
        if quote.is_expired(now) {
            return Err(ServiceError::InvalidOperation(
                "quote validity deadline has passed".to_string(),
            ));
        }

        if quote.status == QuoteStatus::Draft {
            let marked = quote::Entity::update_many()
                .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Sent))
                .col_expr(quote::Column::UpdatedAt, Expr::value(now))
                .filter(quote::Column::Id.eq(quote_id))
                .filter(quote::Column::Status.eq(QuoteStatus::Draft))
                .exec(&*self.db)
                .await?;
            if marked.rows_affected != 1 {
                // Concurrent send or response got there first.
                let current = self.load_quote(quote_id).await?;
                if !current.status.is_open() {
                    return Err(ServiceError::InvalidStatus(format!(
                        "quote is already {}",
                        current.status
                    )));
                }
            }
        }

        // Token lifetime tracks the quote deadline exactly.
        let issued = self
            .tokens
            .issue(TokenKind::QuoteAccess, quote_id, quote.valid_until - now)
            .await?;
        let url = format!("{}/quotes/link/{}", self.public_base_url, issued.token);

        info!(
            quote_id = %quote_id,
            quote_number = %quote.quote_number,
            expires_at = %issued.expires_at,
            "Quote sent"
        );
        metrics::counter!("buildflow_quotes.sent", 1);
        self.send_event(Event::QuoteSent(quote_id)).await;

        Ok(SendQuoteResponse {
            token: issued.token,
            url,
            expires_at: issued.expires_at,
        })
    }

    /// Opens a quote through a customer link and records the view.
    ///
    /// A consumed token keeps working read-only once the quote is terminal,
    /// so the customer can revisit the outcome page. Every other dead-token
    /// shape is a plain denial.
    #[instrument(skip(self, token_value))]
    pub async fn resolve_token(&self, token_value: &str) -> Result<QuoteDetail, ServiceError> {
        let token = self.tokens.lookup(TokenKind::QuoteAccess, token_value).await?;
        let Some(quote) = quote::Entity::find_by_id(token.subject_id)
            .one(&*self.db)
            .await?
        else {
            error!(token_id = %token.id, "Access token references a missing quote");
            return Err(ServiceError::Denied);
        };
        let now = Utc::now();

        if !token.is_live(now) {
            if token.consumed_at.is_some() && quote.status.is_terminal() {
                debug!(quote_id = %quote.id, "Read-only revisit of a responded quote");
                return self.load_detail(quote).await;
            }
            debug!(token_id = %token.id, "Access denied: token is no longer live");
            return Err(ServiceError::Denied);
        }

        let first_view = quote::Entity::update_many()
            .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Viewed))
            .col_expr(quote::Column::FirstViewedAt, Expr::value(Some(now)))
            .col_expr(quote::Column::LastViewedAt, Expr::value(Some(now)))
            .col_expr(quote::Column::UpdatedAt, Expr::value(now))
            .filter(quote::Column::Id.eq(quote.id))
            .filter(quote::Column::Status.eq(QuoteStatus::Sent))
            .exec(&*self.db)
            .await?;
        if first_view.rows_affected == 1 {
            info!(quote_id = %quote.id, "Quote viewed for the first time");
            metrics::counter!("buildflow_quotes.first_viewed", 1);
            self.send_event(Event::QuoteViewed(quote.id)).await;
        } else {
            quote::Entity::update_many()
                .col_expr(quote::Column::LastViewedAt, Expr::value(Some(now)))
                .col_expr(quote::Column::UpdatedAt, Expr::value(now))
                .filter(quote::Column::Id.eq(quote.id))
                .exec(&*self.db)
                .await?;
        }

        let quote = self.load_quote(quote.id).await?;
        self.load_detail(quote).await
    }

    /// Records the customer's accept/decline answer for a link token.
    ///
    /// Acceptance chains into project and invoice provisioning; a failure
    /// there surfaces to the caller while the accepted quote stands.
    #[instrument(skip(self, token_value, notes), fields(response = %response))]
    pub async fn respond(
        &self,
        token_value: &str,
        response: ResponseKind,
        notes: Option<String>,
    ) -> Result<RespondOutcome, ServiceError> {
        let token = self.tokens.lookup(TokenKind::QuoteAccess, token_value).await?;
        let Some(quote) = quote::Entity::find_by_id(token.subject_id)
            .one(&*self.db)
            .await?
        else {
            error!(token_id = %token.id, "Access token references a missing quote");
            return Err(ServiceError::Denied);
        };
        let now = Utc::now();

        if token.consumed_at.is_some() {
            if quote.status.is_terminal() {
                return Err(ServiceError::AlreadyResponded);
            }
            debug!(token_id = %token.id, "Access denied: token already consumed");
            return Err(ServiceError::Denied);
        }
        // An expired-but-unconsumed token falls through on purpose: the
        // deadline guard below turns it into the QuoteExpired the customer
        // should see, not a generic denial.

        let claimed = quote::Entity::update_many()
            .col_expr(
                quote::Column::Status,
                Expr::value(response.terminal_status()),
            )
            .col_expr(quote::Column::Response, Expr::value(Some(response)))
            .col_expr(quote::Column::ResponseNotes, Expr::value(notes.clone()))
            .col_expr(quote::Column::RespondedAt, Expr::value(Some(now)))
            .col_expr(quote::Column::UpdatedAt, Expr::value(now))
            .filter(quote::Column::Id.eq(quote.id))
            .filter(quote::Column::RespondedAt.is_null())
            .filter(
                quote::Column::Status.is_in([QuoteStatus::Sent, QuoteStatus::Viewed]),
            )
            .filter(quote::Column::ValidUntil.gte(now))
            .exec(&*self.db)
            .await?;

        if claimed.rows_affected != 1 {
            let current = self.load_quote(quote.id).await?;
            return Err(match current.response {
                Some(_) => ServiceError::AlreadyResponded,
                None if current.is_expired(now) => ServiceError::QuoteExpired,
                None => ServiceError::InvalidOperation(
                    "quote is not open for a response".to_string(),
                ),
            });
        }

        if !self.tokens.consume(token.id).await? {
            warn!(token_id = %token.id, "Response token was already consumed");
        }
        info!(quote_id = %quote.id, response = %response, "Quote response recorded");
        metrics::counter!("buildflow_quotes.responded", 1, "response" => response.to_string());
        self.send_event(Event::QuoteResponded {
            quote_id: quote.id,
            response: response.to_string(),
        })
        .await;

        match response {
            ResponseKind::Declined => {
                let quote = self.load_quote(quote.id).await?;
                Ok(RespondOutcome::Declined {
                    quote: self.load_detail(quote).await?,
                })
            }
            ResponseKind::Accepted => {
                let acceptance = self
                    .acceptance
                    .accept_quote(quote.id, CustomerInfo::default())
                    .await?;
                let quote = self.load_quote(quote.id).await?;
                Ok(RespondOutcome::Accepted {
                    quote: self.load_detail(quote).await?,
                    acceptance,
                })
            }
        }
    }

    async fn load_quote(&self, quote_id: Uuid) -> Result<quote::Model, ServiceError> {
        quote::Entity::find_by_id(quote_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", quote_id)))
    }

    async fn load_detail(&self, quote: quote::Model) -> Result<QuoteDetail, ServiceError> {
        let items = quote_line_item::Entity::find()
            .filter(quote_line_item::Column::QuoteId.eq(quote.id))
            .order_by_asc(quote_line_item::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(QuoteDetail::from_parts(quote, items, Utc::now()))
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Quote numbers carry the issue date plus a random suffix, e.g.
/// `QT-20260825-4F2A9C1B`.
fn generate_quote_number() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("QT-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

fn validate_financials(request: &CreateQuoteRequest) -> Result<(), ServiceError> {
    for (idx, item) in request.line_items.iter().enumerate() {
        item.validate()?;
        if item.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "line item {}: quantity must be positive",
                idx + 1
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "line item {}: unit price cannot be negative",
                idx + 1
            )));
        }
    }

    if let Some(rate) = request.tax_rate {
        if rate < Decimal::ZERO || rate > dec!(100) {
            return Err(ServiceError::ValidationError(
                "tax rate must be between 0 and 100".to_string(),
            ));
        }
    }

    for (name, pct) in [
        ("down_payment_pct", request.down_payment_pct),
        ("milestone_pct", request.milestone_pct),
        ("final_pct", request.final_pct),
    ] {
        if pct < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "{} cannot be negative",
                name
            )));
        }
    }
    let split = request.down_payment_pct + request.milestone_pct + request.final_pct;
    if split != dec!(100) {
        return Err(ServiceError::ValidationError(format!(
            "payment split must sum to 100, got {}",
            split
        )));
    }

    if let Some(currency) = &request.currency {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ServiceError::ValidationError(
                "currency must be a three-letter ISO code".to_string(),
            ));
        }
    }

    Ok(())
}
