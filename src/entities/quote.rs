use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a quote.
///
/// `Expired` is presentational only: it is computed at read time from
/// `valid_until` and is never written to storage.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuoteStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "viewed")]
    Viewed,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "declined")]
    Declined,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl QuoteStatus {
    /// Legal transition table for stored statuses.
    pub fn can_transition(self, to: QuoteStatus) -> bool {
        use QuoteStatus::*;
        matches!(
            (self, to),
            (Draft, Sent) | (Sent, Viewed) | (Sent, Accepted) | (Sent, Declined)
                | (Viewed, Accepted)
                | (Viewed, Declined)
        )
    }

    /// Accepted and declined quotes never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, QuoteStatus::Accepted | QuoteStatus::Declined)
    }

    /// Statuses from which the customer may still act, deadline permitting.
    pub fn is_open(self) -> bool {
        matches!(self, QuoteStatus::Sent | QuoteStatus::Viewed)
    }
}

/// The customer's answer to a quote.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseKind {
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "declined")]
    Declined,
}

impl ResponseKind {
    pub fn terminal_status(self) -> QuoteStatus {
        match self {
            ResponseKind::Accepted => QuoteStatus::Accepted,
            ResponseKind::Declined => QuoteStatus::Declined,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub quote_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub project_name: String,
    pub project_address: String,
    pub status: QuoteStatus,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub down_payment_pct: Decimal,
    pub milestone_pct: Decimal,
    pub final_pct: Decimal,
    pub valid_until: DateTime<Utc>,
    pub response: Option<ResponseKind>,
    pub response_notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The three-part payment schedule derived from a quote's split percentages.
/// The final leg absorbs the rounding residual so the parts always sum to
/// the quote total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub down_payment: Decimal,
    pub milestone: Decimal,
    pub final_payment: Decimal,
}

/// Percentage share of an amount, rounded half-up to the currency minor unit.
pub fn share_of(amount: Decimal, pct: Decimal) -> Decimal {
    (amount * pct / dec!(100)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Stored status adjusted for the validity deadline. Expiry pre-empts
    /// customer action but never rewrites a terminal status.
    pub fn effective_status(&self, now: DateTime<Utc>) -> QuoteStatus {
        if self.status.is_open() && self.is_expired(now) {
            QuoteStatus::Expired
        } else {
            self.status
        }
    }

    pub fn down_payment_amount(&self) -> Decimal {
        share_of(self.total, self.down_payment_pct)
    }

    pub fn payment_schedule(&self) -> PaymentSchedule {
        let down_payment = share_of(self.total, self.down_payment_pct);
        let milestone = share_of(self.total, self.milestone_pct);
        PaymentSchedule {
            down_payment,
            milestone,
            final_payment: self.total - down_payment - milestone,
        }
    }
}

/// A response timestamp and a terminal status only ever appear together.
fn response_state_consistent(status: QuoteStatus, responded_at: Option<DateTime<Utc>>) -> bool {
    status.is_terminal() == responded_at.is_some()
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::quote_line_item::Entity")]
    LineItems,
    #[sea_orm(has_one = "super::project::Entity")]
    Project,
}

impl Related<super::quote_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        if insert && active_model.id.is_not_set() {
            active_model.id = ActiveValue::Set(Uuid::new_v4());
        }

        let status = match &active_model.status {
            ActiveValue::Set(s) | ActiveValue::Unchanged(s) => Some(*s),
            ActiveValue::NotSet => None,
        };
        if status == Some(QuoteStatus::Expired) {
            return Err(DbErr::Custom(
                "quote status 'expired' is computed at read time and cannot be stored".into(),
            ));
        }
        let responded_at = match &active_model.responded_at {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(*v),
            ActiveValue::NotSet => None,
        };
        if let (Some(status), Some(responded_at)) = (status, responded_at) {
            if !response_state_consistent(status, responded_at) {
                return Err(DbErr::Custom(
                    "quote response timestamp must be set exactly when status is terminal".into(),
                ));
            }
        }

        Ok(active_model)
    }
}
