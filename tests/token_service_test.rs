mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use rstest::rstest;
use uuid::Uuid;

use buildflow_api::entities::access_token::TokenKind;
use buildflow_api::errors::ServiceError;
use buildflow_api::services::tokens::TokenService;

fn service(app: &TestApp) -> TokenService {
    TokenService::new(app.state.db.clone())
}

#[tokio::test]
async fn verification_claims_the_token_in_the_same_step() {
    let app = TestApp::new().await;
    let tokens = service(&app);
    let subject = Uuid::new_v4();

    let issued = tokens
        .issue(TokenKind::Login, subject, Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(issued.token.len(), 64);
    assert!(issued.expires_at > Utc::now());

    let claimed = tokens
        .verify_and_consume(TokenKind::Login, &issued.token)
        .await
        .unwrap();
    assert_eq!(claimed.subject_id, subject);
    assert!(claimed.consumed_at.is_some());

    let reuse = tokens
        .verify_and_consume(TokenKind::Login, &issued.token)
        .await;
    assert_matches!(reuse, Err(ServiceError::Denied));
}

#[rstest]
#[case::zero_ttl(0)]
#[case::negative_ttl(-60)]
#[tokio::test]
async fn non_positive_ttl_tokens_never_verify(#[case] ttl_secs: i64) {
    let app = TestApp::new().await;
    let tokens = service(&app);

    let issued = tokens
        .issue(TokenKind::Login, Uuid::new_v4(), Duration::seconds(ttl_secs))
        .await
        .unwrap();

    let result = tokens
        .verify_and_consume(TokenKind::Login, &issued.token)
        .await;
    assert_matches!(result, Err(ServiceError::Denied));

    // The row exists; only redemption is closed off.
    let row = tokens.lookup(TokenKind::Login, &issued.token).await.unwrap();
    assert!(!row.is_live(Utc::now()));
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let app = TestApp::new().await;
    let tokens = service(&app);

    let issued = tokens
        .issue(TokenKind::Login, Uuid::new_v4(), Duration::hours(1))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        tokens.verify_and_consume(TokenKind::Login, &issued.token),
        tokens.verify_and_consume(TokenKind::Login, &issued.token),
    );
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(ServiceError::Denied));
}

#[tokio::test]
async fn reissue_retires_the_previous_token() {
    let app = TestApp::new().await;
    let tokens = service(&app);
    let subject = Uuid::new_v4();

    let first = tokens
        .issue(TokenKind::QuoteAccess, subject, Duration::hours(1))
        .await
        .unwrap();
    let second = tokens
        .issue(TokenKind::QuoteAccess, subject, Duration::hours(1))
        .await
        .unwrap();
    assert_ne!(first.token, second.token);

    let stale = tokens
        .verify_and_consume(TokenKind::QuoteAccess, &first.token)
        .await;
    assert_matches!(stale, Err(ServiceError::Denied));

    let fresh = tokens
        .verify_and_consume(TokenKind::QuoteAccess, &second.token)
        .await;
    assert!(fresh.is_ok());
}

#[tokio::test]
async fn kind_must_match_at_verification() {
    let app = TestApp::new().await;
    let tokens = service(&app);

    let issued = tokens
        .issue(TokenKind::QuoteAccess, Uuid::new_v4(), Duration::hours(1))
        .await
        .unwrap();

    let wrong_kind = tokens.verify_and_consume(TokenKind::Login, &issued.token).await;
    assert_matches!(wrong_kind, Err(ServiceError::Denied));

    // Unclaimed by the failed attempt; the right kind still works.
    let right_kind = tokens
        .verify_and_consume(TokenKind::QuoteAccess, &issued.token)
        .await;
    assert!(right_kind.is_ok());
}

#[tokio::test]
async fn lookup_tolerates_consumed_tokens() {
    let app = TestApp::new().await;
    let tokens = service(&app);
    let subject = Uuid::new_v4();

    let issued = tokens
        .issue(TokenKind::QuoteAccess, subject, Duration::hours(1))
        .await
        .unwrap();
    tokens
        .verify_and_consume(TokenKind::QuoteAccess, &issued.token)
        .await
        .unwrap();

    let row = tokens
        .lookup(TokenKind::QuoteAccess, &issued.token)
        .await
        .unwrap();
    assert_eq!(row.subject_id, subject);
    assert!(row.consumed_at.is_some());
    assert!(!row.is_live(Utc::now()));
}
