mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{money, read_json, sample_quote_payload, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

use buildflow_api::entities::{access_token, quote};

async fn create_quote(app: &TestApp) -> Value {
    let response = app
        .request(Method::POST, "/api/v1/quotes", Some(sample_quote_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn send_quote(app: &TestApp, quote_id: &str) -> Value {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/send", quote_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

/// Push the quote (and any issued link) past its validity deadline.
async fn push_past_deadline(app: &TestApp, quote_id: Uuid) {
    let past = Utc::now() - Duration::minutes(5);
    quote::Entity::update_many()
        .col_expr(quote::Column::ValidUntil, Expr::value(past))
        .filter(quote::Column::Id.eq(quote_id))
        .exec(&*app.state.db)
        .await
        .expect("backdate quote deadline");
    access_token::Entity::update_many()
        .col_expr(access_token::Column::ExpiresAt, Expr::value(past))
        .filter(access_token::Column::SubjectId.eq(quote_id))
        .exec(&*app.state.db)
        .await
        .expect("backdate token expiry");
}

#[tokio::test]
async fn created_quote_computes_totals_and_schedule() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;

    assert_eq!(quote["status"], "draft");
    assert_eq!(money(&quote["subtotal"]), dec!(10000.00));
    assert_eq!(money(&quote["tax_amount"]), dec!(0));
    assert_eq!(money(&quote["total"]), dec!(10000.00));
    assert_eq!(quote["currency"], "USD");
    assert_eq!(money(&quote["payment_schedule"]["down_payment"]), dec!(4000.00));
    assert_eq!(money(&quote["payment_schedule"]["milestone"]), dec!(4000.00));
    assert_eq!(
        money(&quote["payment_schedule"]["final_payment"]),
        dec!(2000.00)
    );

    let items = quote["line_items"].as_array().expect("line items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["category"], "Demolition");
    assert_eq!(money(&items[0]["line_total"]), dec!(2500.00));
    assert_eq!(money(&items[1]["line_total"]), dec!(7500.00));
    assert!(quote["quote_number"]
        .as_str()
        .expect("quote number")
        .starts_with("QT-"));
}

#[tokio::test]
async fn tax_rate_applies_to_subtotal() {
    let app = TestApp::new().await;
    let mut payload = sample_quote_payload();
    payload["tax_rate"] = json!("8.25");

    let response = app.request(Method::POST, "/api/v1/quotes", Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let quote = read_json(response).await;

    assert_eq!(money(&quote["tax_amount"]), dec!(825.00));
    assert_eq!(money(&quote["total"]), dec!(10825.00));
}

#[tokio::test]
async fn unbalanced_payment_split_is_rejected() {
    let app = TestApp::new().await;
    let mut payload = sample_quote_payload();
    payload["down_payment_pct"] = json!("50");

    let response = app.request(Method::POST, "/api/v1/quotes", Some(payload)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("sum to 100"));
}

#[tokio::test]
async fn sending_issues_link_and_resending_rotates_it() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id").to_string();

    let first = send_quote(&app, &quote_id).await;
    let first_token = first["token"].as_str().expect("token").to_string();
    assert_eq!(first_token.len(), 64);
    assert!(first["url"]
        .as_str()
        .expect("url")
        .ends_with(&format!("/quotes/link/{}", first_token)));

    let detail = read_json(
        app.request(Method::GET, &format!("/api/v1/quotes/{}", quote_id), None)
            .await,
    )
    .await;
    assert_eq!(detail["status"], "sent");

    // Re-send retires the first link and hands out a fresh one.
    let second = send_quote(&app, &quote_id).await;
    let second_token = second["token"].as_str().expect("token").to_string();
    assert_ne!(second_token, first_token);

    let stale = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", first_token),
            None,
        )
        .await;
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);

    let fresh = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", second_token),
            None,
        )
        .await;
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn link_view_transitions_to_viewed_once() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id").to_string();
    let sent = send_quote(&app, &quote_id).await;
    let token = sent["token"].as_str().expect("token");

    let first_view = read_json(
        app.request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", token),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(first_view["status"], "viewed");
    let first_viewed_at = first_view["first_viewed_at"]
        .as_str()
        .expect("first viewed timestamp")
        .to_string();

    let second_view = read_json(
        app.request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", token),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(second_view["status"], "viewed");
    assert_eq!(second_view["first_viewed_at"], first_viewed_at.as_str());
    assert!(second_view["last_viewed_at"].is_string());
}

#[tokio::test]
async fn decline_records_response_and_consumes_link() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id").to_string();
    let sent = send_quote(&app, &quote_id).await;
    let token = sent["token"].as_str().expect("token");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/link/{}/response", token),
            Some(json!({"response": "declined", "notes": "Going another direction"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["quote"]["status"], "declined");
    assert_eq!(body["quote"]["response"], "declined");
    assert_eq!(body["quote"]["response_notes"], "Going another direction");
    assert!(body["quote"]["responded_at"].is_string());
    assert!(body.get("acceptance").is_none());

    // A second response through the same link is a conflict, not a denial:
    // the customer should see that the quote was already answered.
    let again = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/link/{}/response", token),
            Some(json!({"response": "accepted"})),
        )
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let conflict = read_json(again).await;
    assert_eq!(conflict["message"], "This quote has already been answered");

    // The consumed link still opens the outcome page read-only.
    let revisit = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", token),
            None,
        )
        .await;
    assert_eq!(revisit.status(), StatusCode::OK);
    let snapshot = read_json(revisit).await;
    assert_eq!(snapshot["status"], "declined");
}

#[tokio::test]
async fn responding_after_deadline_returns_quote_expired() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;
    let quote_id: Uuid = quote["id"].as_str().expect("quote id").parse().unwrap();
    let sent = send_quote(&app, &quote_id.to_string()).await;
    let token = sent["token"].as_str().expect("token");

    push_past_deadline(&app, quote_id).await;

    // Even a first response attempt reports expiry, not a generic denial.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/link/{}/response", token),
            Some(json!({"response": "accepted"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::GONE);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "This quote has expired and can no longer be answered"
    );

    // Viewing through the dead link is denied outright.
    let view = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", token),
            None,
        )
        .await;
    assert_eq!(view.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn open_quotes_past_deadline_read_as_expired() {
    let app = TestApp::new().await;
    let quote = create_quote(&app).await;
    let quote_id: Uuid = quote["id"].as_str().expect("quote id").parse().unwrap();
    send_quote(&app, &quote_id.to_string()).await;
    push_past_deadline(&app, quote_id).await;

    let detail = read_json(
        app.request(Method::GET, &format!("/api/v1/quotes/{}", quote_id), None)
            .await,
    )
    .await;
    assert_eq!(detail["status"], "expired");

    let listing = read_json(app.request(Method::GET, "/api/v1/quotes", None).await).await;
    assert_eq!(listing["pagination"]["total"], 1);
    assert_eq!(listing["data"][0]["status"], "expired");
}

#[tokio::test]
async fn unknown_ids_and_tokens_read_as_not_found() {
    let app = TestApp::new().await;

    let missing_quote = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(missing_quote.status(), StatusCode::NOT_FOUND);

    let bad_token = app
        .request(
            Method::GET,
            &format!("/api/v1/quotes/link/{}", "f".repeat(64)),
            None,
        )
        .await;
    assert_eq!(bad_token.status(), StatusCode::NOT_FOUND);
    let body = read_json(bad_token).await;
    assert_eq!(body["message"], "This link is no longer valid");
}
