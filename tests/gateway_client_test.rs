use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use buildflow_api::gateway::{
    GatewayError, HttpPaymentGateway, IntentMetadata, PaymentGateway, PaymentIntentRequest,
};

fn sample_request() -> PaymentIntentRequest {
    PaymentIntentRequest {
        amount: dec!(4000.00),
        currency: "USD".to_string(),
        description: "Down payment for quote QT-20250601-0A1B2C3D".to_string(),
        metadata: IntentMetadata {
            invoice_id: Uuid::new_v4(),
            quote_id: Uuid::new_v4(),
            payment_type: "down_payment".to_string(),
        },
    }
}

fn gateway_for(server: &MockServer, api_key: Option<&str>) -> HttpPaymentGateway {
    HttpPaymentGateway::new(
        server.uri(),
        api_key.map(str::to_string),
        Duration::from_secs(2),
    )
    .expect("build gateway client")
}

#[tokio::test]
async fn created_intent_returns_id_and_client_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_partial_json(json!({
            "amount": "4000.00",
            "currency": "USD",
            "metadata": {"payment_type": "down_payment"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_20d8f3",
            "client_secret": "pi_20d8f3_secret_x1",
            "status": "requires_payment_method"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, Some("sk_test_123"));
    let handle = gateway
        .create_payment_intent(sample_request())
        .await
        .expect("intent created");

    assert_eq!(handle.intent_id, "pi_20d8f3");
    assert_eq!(handle.client_handle.as_deref(), Some("pi_20d8f3_secret_x1"));
}

#[tokio::test]
async fn missing_client_secret_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "pi_no_secret"})),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, None);
    let handle = gateway
        .create_payment_intent(sample_request())
        .await
        .expect("intent created");

    assert_eq!(handle.intent_id, "pi_no_secret");
    assert!(handle.client_handle.is_none());
}

#[tokio::test]
async fn non_success_status_maps_to_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(
            ResponseTemplate::new(402).set_body_string("amount below minimum charge"),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, None);
    let result = gateway.create_payment_intent(sample_request()).await;

    assert_matches!(result, Err(GatewayError::Rejected(message)) => {
        assert!(message.contains("402"));
        assert!(message.contains("amount below minimum charge"));
    });
}

#[tokio::test]
async fn slow_gateway_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "pi_slow"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), None, Duration::from_millis(250))
        .expect("build gateway client");
    let result = gateway.create_payment_intent(sample_request()).await;

    assert_matches!(result, Err(GatewayError::Timeout));
}

#[tokio::test]
async fn unparseable_body_maps_to_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, None);
    let result = gateway.create_payment_intent(sample_request()).await;

    assert_matches!(result, Err(GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_gateway_maps_to_transport_error() {
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let gateway = HttpPaymentGateway::new(uri, None, Duration::from_secs(2))
        .expect("build gateway client");
    let result = gateway.create_payment_intent(sample_request()).await;

    assert_matches!(result, Err(GatewayError::Transport(_)));
}
