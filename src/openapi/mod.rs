use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BuildFlow API",
        version = "1.0.0",
        description = r#"
# BuildFlow Quote-to-Cash API

Backend for construction project management: quoting, magic-link quote
acceptance, project and invoice provisioning, and payment reconciliation.

## Quote links

Customers never authenticate. A quote is shared through a single-use link
(`/quotes/link/{token}`) whose token is the only credential; any dead token
answers with a generic 404 ("This link is no longer valid").

## Error Handling

Errors use a consistent response format with appropriate HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "This quote has already been answered",
  "timestamp": "2026-08-25T00:00:00Z"
}
```

## Pagination

List endpoints support pagination with the following query parameters:
- `page`: Page number (default: 1)
- `per_page`: Items per page (default: 20, max: 100)
        "#,
        contact(
            name = "BuildFlow Support",
            email = "support@buildflow.dev"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Quotes", description = "Office-facing quote management"),
        (name = "Quote links", description = "Customer-facing single-use link endpoints"),
        (name = "Projects", description = "Projects and invoices provisioned by acceptance"),
        (name = "Payments", description = "Payment gateway webhook")
    ),
    paths(
        // Quotes
        crate::handlers::quotes::create_quote,
        crate::handlers::quotes::list_quotes,
        crate::handlers::quotes::get_quote,
        crate::handlers::quotes::send_quote,
        crate::handlers::quotes::accept_quote,

        // Quote links
        crate::handlers::quotes::resolve_quote_link,
        crate::handlers::quotes::respond_to_quote_link,

        // Projects
        crate::handlers::projects::list_projects,
        crate::handlers::projects::get_project,
        crate::handlers::projects::list_project_invoices,

        // Webhooks
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::handlers::common::PaginatedResponse<serde_json::Value>,
            crate::handlers::common::PaginationMeta,

            // Quote types
            crate::services::quotes::CreateQuoteRequest,
            crate::services::quotes::LineItemInput,
            crate::services::quotes::QuoteDetail,
            crate::services::quotes::LineItemView,
            crate::services::quotes::PaymentScheduleView,
            crate::services::quotes::QuoteSummary,
            crate::services::quotes::SendQuoteResponse,
            crate::handlers::quotes::AcceptQuoteRequest,
            crate::handlers::quotes::RespondRequest,
            crate::handlers::quotes::QuoteResponseResult,
            crate::handlers::quotes::AcceptancePackage,
            crate::handlers::quotes::PaymentHandleView,

            // Project types
            crate::services::projects::ProjectView,
            crate::services::projects::InvoiceView,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
