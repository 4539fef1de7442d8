mod common;

use axum::http::{Method, StatusCode};
use common::{money, read_json, sample_quote_payload, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use buildflow_api::gateway::GatewayError;

async fn send_new_quote(app: &TestApp) -> Value {
    let created = app
        .request(Method::POST, "/api/v1/quotes", Some(sample_quote_payload()))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let quote = read_json(created).await;
    let quote_id = quote["id"].as_str().expect("quote id");

    let sent = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/send", quote_id),
            None,
        )
        .await;
    assert_eq!(sent.status(), StatusCode::OK);
    let link = read_json(sent).await;

    json!({
        "id": quote_id,
        "token": link["token"],
        "total": quote["total"],
    })
}

async fn project_total(app: &TestApp) -> u64 {
    let listing = read_json(app.request(Method::GET, "/api/v1/projects", None).await).await;
    listing["pagination"]["total"].as_u64().expect("total")
}

#[tokio::test]
async fn accepting_via_link_provisions_project_invoice_and_intent() {
    let app = TestApp::new().await;
    let quote = send_new_quote(&app).await;
    let token = quote["token"].as_str().expect("token");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/link/{}/response", token),
            Some(json!({"response": "accepted"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;

    assert_eq!(body["quote"]["status"], "accepted");
    assert_eq!(body["quote"]["response"], "accepted");

    let acceptance = &body["acceptance"];
    assert_eq!(acceptance["project"]["customer_name"], "Dana Fuller");
    assert_eq!(acceptance["project"]["status"], "planning");
    assert_eq!(money(&acceptance["project"]["budget"]), dec!(10000.00));

    let invoice = &acceptance["invoice"];
    assert_eq!(invoice["payment_type"], "down_payment");
    assert_eq!(money(&invoice["amount"]), dec!(4000.00));
    assert_eq!(invoice["status"], "pending");
    assert!(invoice["invoice_number"]
        .as_str()
        .expect("invoice number")
        .starts_with("INV-"));
    let intent_id = invoice["payment_intent_id"]
        .as_str()
        .expect("intent attached")
        .to_string();

    // Only the call that opened the intent hands the client secret out.
    assert_eq!(acceptance["payment"]["intent_id"], intent_id.as_str());
    assert!(acceptance["payment"]["client_handle"].is_string());

    let requests = app.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, dec!(4000.00));
    assert_eq!(requests[0].currency, "USD");
    assert_eq!(requests[0].metadata.payment_type, "down_payment");
    assert_eq!(
        requests[0].metadata.invoice_id.to_string(),
        invoice["id"].as_str().expect("invoice id")
    );
    assert_eq!(
        requests[0].metadata.quote_id.to_string(),
        quote["id"].as_str().expect("quote id")
    );
}

#[tokio::test]
async fn repeated_acceptance_replays_the_first_outcome() {
    let app = TestApp::new().await;
    let quote = send_new_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id");

    let first = read_json(
        app.request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({"customer_name": "Dana F.", "customer_email": "dana@fullerbuild.test"})),
        )
        .await,
    )
    .await;
    let second_response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({})),
        )
        .await;
    assert_eq!(second_response.status(), StatusCode::OK);
    let second = read_json(second_response).await;

    assert_eq!(first["project"]["id"], second["project"]["id"]);
    assert_eq!(first["invoice"]["id"], second["invoice"]["id"]);
    assert_eq!(
        first["invoice"]["payment_intent_id"],
        second["invoice"]["payment_intent_id"]
    );
    // The replay reports the stored intent without a fresh client secret.
    assert!(first["payment"]["client_handle"].is_string());
    assert!(second["payment"]["client_handle"].is_null());

    assert_eq!(app.gateway.request_count(), 1);
    assert_eq!(project_total(&app).await, 1);

    let invoices = read_json(
        app.request(
            Method::GET,
            &format!(
                "/api/v1/projects/{}/invoices",
                first["project"]["id"].as_str().expect("project id")
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(invoices.as_array().expect("invoice list").len(), 1);
}

#[tokio::test]
async fn gateway_timeout_keeps_progress_and_retry_resumes() {
    let app = TestApp::new().await;
    let quote = send_new_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id");

    app.gateway.plan_next(Err(GatewayError::Timeout));
    let timed_out = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({})),
        )
        .await;
    assert_eq!(timed_out.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = read_json(timed_out).await;
    assert_eq!(body["message"], "Payment gateway timed out");

    // Project and invoice survived the failed attempt.
    assert_eq!(project_total(&app).await, 1);
    let projects = read_json(app.request(Method::GET, "/api/v1/projects", None).await).await;
    let project_id = projects["data"][0]["id"].as_str().expect("project id");
    let invoices = read_json(
        app.request(
            Method::GET,
            &format!("/api/v1/projects/{}/invoices", project_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(invoices[0]["status"], "draft");
    assert!(invoices[0]["payment_intent_id"].is_null());

    // The retry picks up at the intent step instead of starting over.
    let retried = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({})),
        )
        .await;
    assert_eq!(retried.status(), StatusCode::OK);
    let outcome = read_json(retried).await;
    assert_eq!(outcome["project"]["id"], project_id);
    assert_eq!(outcome["invoice"]["status"], "pending");
    assert!(outcome["invoice"]["payment_intent_id"].is_string());

    assert_eq!(app.gateway.request_count(), 2);
    assert_eq!(project_total(&app).await, 1);
}

#[tokio::test]
async fn gateway_rejection_surfaces_as_bad_gateway() {
    let app = TestApp::new().await;
    let quote = send_new_quote(&app).await;
    let quote_id = quote["id"].as_str().expect("quote id");

    app.gateway
        .plan_next(Err(GatewayError::Rejected("amount below minimum".into())));
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn draft_quote_cannot_be_accepted_directly() {
    let app = TestApp::new().await;
    let created = read_json(
        app.request(Method::POST, "/api/v1/quotes", Some(sample_quote_payload()))
            .await,
    )
    .await;
    let quote_id = created["id"].as_str().expect("quote id");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote_id),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(response)
        .await["message"]
        .as_str()
        .expect("error message")
        .contains("only a sent quote"));
}

#[tokio::test]
async fn declined_quote_cannot_be_accepted_afterwards() {
    let app = TestApp::new().await;
    let quote = send_new_quote(&app).await;
    let token = quote["token"].as_str().expect("token");

    let declined = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/link/{}/response", token),
            Some(json!({"response": "declined"})),
        )
        .await;
    assert_eq!(declined.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/quotes/{}/accept", quote["id"].as_str().expect("id")),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(project_total(&app).await, 0);
    assert_eq!(app.gateway.request_count(), 0);
}
