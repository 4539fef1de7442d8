use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::quote::ResponseKind,
    errors::ServiceError,
    handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams},
    services::acceptance::{AcceptanceOutcome, CustomerInfo},
    services::projects::{InvoiceView, ProjectView},
    services::quotes::{CreateQuoteRequest, QuoteDetail, RespondOutcome},
    AppState,
};

/// Customer contact details for a direct (phone/in-person) acceptance.
/// Missing fields fall back to the contact stored on the quote.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct AcceptQuoteRequest {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RespondRequest {
    #[schema(value_type = String, example = "accepted")]
    pub response: ResponseKind,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentHandleView {
    pub intent_id: String,
    /// Only present on the call that actually opened the intent.
    pub client_handle: Option<String>,
}

/// What acceptance provisioned, in one payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptancePackage {
    pub project: ProjectView,
    pub invoice: InvoiceView,
    pub payment: Option<PaymentHandleView>,
}

impl From<AcceptanceOutcome> for AcceptancePackage {
    fn from(outcome: AcceptanceOutcome) -> Self {
        Self {
            project: ProjectView::from(outcome.project),
            invoice: InvoiceView::from(outcome.invoice),
            payment: outcome.payment.map(|handle| PaymentHandleView {
                intent_id: handle.intent_id,
                client_handle: handle.client_handle,
            }),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponseResult {
    pub quote: QuoteDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<AcceptancePackage>,
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    request_body = CreateQuoteRequest,
    responses(
        (status = 201, description = "Quote created", body = QuoteDetail),
        (status = 400, description = "Invalid quote data")
    ),
    tag = "Quotes"
)]
pub async fn create_quote(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let quote = state.services.quotes.create_quote(payload).await?;
    Ok(created_response(quote))
}

#[utoipa::path(
    get,
    path = "/api/v1/quotes",
    params(PaginationParams),
    responses(
        (status = 200, description = "Quotes, newest first")
    ),
    tag = "Quotes"
)]
pub async fn list_quotes(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (quotes, total) = state
        .services
        .quotes
        .list_quotes(params.page, params.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        quotes,
        params.page,
        params.per_page,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/quotes/{id}",
    params(("id" = Uuid, Path, description = "Quote id")),
    responses(
        (status = 200, description = "Quote with line items", body = QuoteDetail),
        (status = 404, description = "Quote not found")
    ),
    tag = "Quotes"
)]
pub async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let quote = state.services.quotes.get_quote(id).await?;
    Ok(success_response(quote))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/send",
    params(("id" = Uuid, Path, description = "Quote id")),
    responses(
        (status = 200, description = "Access link issued", body = crate::services::quotes::SendQuoteResponse),
        (status = 400, description = "Quote cannot be sent"),
        (status = 404, description = "Quote not found")
    ),
    tag = "Quotes"
)]
pub async fn send_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let sent = state.services.quotes.send_quote(id).await?;
    Ok(success_response(sent))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/accept",
    params(("id" = Uuid, Path, description = "Quote id")),
    request_body = AcceptQuoteRequest,
    responses(
        (status = 200, description = "Quote accepted; project and invoice provisioned", body = AcceptancePackage),
        (status = 404, description = "Quote not found"),
        (status = 409, description = "Quote already responded"),
        (status = 410, description = "Quote expired"),
        (status = 502, description = "Provisioning failed part-way; retry resumes"),
        (status = 504, description = "Payment gateway timed out")
    ),
    tag = "Quotes"
)]
pub async fn accept_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptQuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let info = CustomerInfo {
        customer_name: payload.customer_name,
        customer_email: payload.customer_email,
    };
    let outcome = state.services.acceptance.accept_quote(id, info).await?;
    Ok(success_response(AcceptancePackage::from(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/quotes/link/{token}",
    params(("token" = String, Path, description = "Single-use access token")),
    responses(
        (status = 200, description = "Quote snapshot for the customer", body = QuoteDetail),
        (status = 404, description = "Link is no longer valid")
    ),
    tag = "Quote links"
)]
pub async fn resolve_quote_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let quote = state.services.quotes.resolve_token(&token).await?;
    Ok(success_response(quote))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes/link/{token}/response",
    params(("token" = String, Path, description = "Single-use access token")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Response recorded", body = QuoteResponseResult),
        (status = 404, description = "Link is no longer valid"),
        (status = 409, description = "Quote already responded"),
        (status = 410, description = "Quote expired"),
        (status = 502, description = "Acceptance provisioning failed"),
        (status = 504, description = "Payment gateway timed out")
    ),
    tag = "Quote links"
)]
pub async fn respond_to_quote_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<RespondRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let outcome = state
        .services
        .quotes
        .respond(&token, payload.response, payload.notes)
        .await?;
    let result = match outcome {
        RespondOutcome::Accepted { quote, acceptance } => QuoteResponseResult {
            quote,
            acceptance: Some(AcceptancePackage::from(acceptance)),
        },
        RespondOutcome::Declined { quote } => QuoteResponseResult {
            quote,
            acceptance: None,
        },
    };
    Ok(success_response(result))
}
