use crate::db::DbPool;
use crate::entities::access_token::{self, TokenKind};
use crate::errors::ServiceError;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// A freshly issued token. `token` is the cleartext value; it exists only in
/// this struct and in the link handed to the customer, never in storage.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and redeems single-use access tokens.
///
/// Storage only ever sees the SHA-256 hash of a token. Redemption failures
/// are all reported as [`ServiceError::Denied`]; the concrete reason is
/// logged server-side.
#[derive(Clone)]
pub struct TokenService {
    db: Arc<DbPool>,
}

/// 256 bits of randomness rendered as 64 hex characters.
fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn hash_token(token_value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token_value.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn denial_reason(row: Option<&access_token::Model>, now: DateTime<Utc>) -> &'static str {
    match row {
        None => "unknown token",
        Some(row) if row.consumed_at.is_some() => "token already consumed",
        Some(row) if now >= row.expires_at => "token expired",
        Some(_) => "token kind mismatch",
    }
}

impl TokenService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Issue a new token for `subject_id`, retiring any prior live token of
    /// the same kind for the same subject. A non-positive `ttl` produces a
    /// token that is already expired; issuing succeeds, redemption never will.
    #[instrument(skip(self), fields(kind = %kind, subject_id = %subject_id))]
    pub async fn issue(
        &self,
        kind: TokenKind,
        subject_id: Uuid,
        ttl: Duration,
    ) -> Result<IssuedToken, ServiceError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token_value = generate_token_value();

        let txn = self.db.begin().await?;

        let retired = access_token::Entity::update_many()
            .col_expr(access_token::Column::ConsumedAt, Expr::value(Some(now)))
            .filter(access_token::Column::Kind.eq(kind))
            .filter(access_token::Column::SubjectId.eq(subject_id))
            .filter(access_token::Column::ConsumedAt.is_null())
            .exec(&txn)
            .await?;
        if retired.rows_affected > 0 {
            debug!(
                retired = retired.rows_affected,
                "Retired previously issued tokens for subject"
            );
        }

        access_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token_hash: Set(hash_token(&token_value)),
            kind: Set(kind),
            subject_id: Set(subject_id),
            expires_at: Set(expires_at),
            consumed_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(IssuedToken {
            token: token_value,
            expires_at,
        })
    }

    /// Find the stored row for a presented token without judging liveness.
    /// Callers that tolerate consumed tokens (quote links revisited after a
    /// response) apply their own policy on the returned row.
    #[instrument(skip(self, token_value), fields(kind = %kind))]
    pub async fn lookup(
        &self,
        kind: TokenKind,
        token_value: &str,
    ) -> Result<access_token::Model, ServiceError> {
        let row = access_token::Entity::find()
            .filter(access_token::Column::TokenHash.eq(hash_token(token_value)))
            .filter(access_token::Column::Kind.eq(kind))
            .one(&*self.db)
            .await?;

        match row {
            Some(row) => Ok(row),
            None => {
                debug!("Access denied: unknown token");
                Err(ServiceError::Denied)
            }
        }
    }

    /// Atomically claim a single-use token: exactly one of any number of
    /// concurrent calls with the same token succeeds. The claim is a single
    /// conditional update, not a read followed by a write.
    #[instrument(skip(self, token_value), fields(kind = %kind))]
    pub async fn verify_and_consume(
        &self,
        kind: TokenKind,
        token_value: &str,
    ) -> Result<access_token::Model, ServiceError> {
        let token_hash = hash_token(token_value);
        let now = Utc::now();

        let claimed = access_token::Entity::update_many()
            .col_expr(access_token::Column::ConsumedAt, Expr::value(Some(now)))
            .filter(access_token::Column::TokenHash.eq(token_hash.clone()))
            .filter(access_token::Column::Kind.eq(kind))
            .filter(access_token::Column::ConsumedAt.is_null())
            .filter(access_token::Column::ExpiresAt.gt(now))
            .exec(&*self.db)
            .await?;

        if claimed.rows_affected != 1 {
            let row = access_token::Entity::find()
                .filter(access_token::Column::TokenHash.eq(token_hash))
                .one(&*self.db)
                .await?;
            debug!(
                reason = denial_reason(row.as_ref(), now),
                "Access denied: token claim failed"
            );
            return Err(ServiceError::Denied);
        }

        let row = access_token::Entity::find()
            .filter(access_token::Column::TokenHash.eq(token_hash))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::Denied)?;

        Ok(row)
    }

    /// Mark a token consumed. Returns whether this call performed the
    /// consumption (false when someone got there first).
    #[instrument(skip(self))]
    pub async fn consume(&self, token_id: Uuid) -> Result<bool, ServiceError> {
        let result = access_token::Entity::update_many()
            .col_expr(
                access_token::Column::ConsumedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(access_token::Column::Id.eq(token_id))
            .filter(access_token::Column::ConsumedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
