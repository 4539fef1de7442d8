use chrono::{Duration, Utc};
use proptest::prelude::*;
use proptest::sample::select;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use strum::IntoEnumIterator;
use uuid::Uuid;

use buildflow_api::entities::quote::{share_of, Model, QuoteStatus};

fn quote_with(total: Decimal, down: Decimal, milestone: Decimal, fin: Decimal) -> Model {
    let now = Utc::now();
    Model {
        id: Uuid::new_v4(),
        quote_number: "QT-20250601-0A1B2C3D".to_string(),
        customer_name: "Dana Alvarez".to_string(),
        customer_email: "dana@example.com".to_string(),
        project_name: "Kitchen remodel".to_string(),
        project_address: "12 Birch Lane".to_string(),
        status: QuoteStatus::Sent,
        subtotal: total,
        tax_rate: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        total,
        currency: "USD".to_string(),
        down_payment_pct: down,
        milestone_pct: milestone,
        final_pct: fin,
        valid_until: now + Duration::days(14),
        response: None,
        response_notes: None,
        responded_at: None,
        first_viewed_at: None,
        last_viewed_at: None,
        notes: None,
        created_at: now,
        updated_at: None,
    }
}

/// Totals up to one million, in cents.
fn money() -> impl Strategy<Value = Decimal> {
    (0i64..=100_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// A three-way percentage split that sums to exactly 100.00.
fn split() -> impl Strategy<Value = (Decimal, Decimal, Decimal)> {
    (0i64..=10_000).prop_flat_map(|down| {
        (Just(down), 0i64..=(10_000 - down)).prop_map(|(down, milestone)| {
            let fin = 10_000 - down - milestone;
            (
                Decimal::new(down, 2),
                Decimal::new(milestone, 2),
                Decimal::new(fin, 2),
            )
        })
    })
}

proptest! {
    #[test]
    fn schedule_parts_always_sum_to_total(
        total in money(),
        (down, milestone, fin) in split(),
    ) {
        let quote = quote_with(total, down, milestone, fin);
        let schedule = quote.payment_schedule();

        prop_assert_eq!(
            schedule.down_payment + schedule.milestone + schedule.final_payment,
            total
        );
        // Each rounding moves a leg by at most half a cent, so the final leg
        // sits within 1.5 cents of its own nominal share.
        prop_assert!(schedule.final_payment >= share_of(total, fin) - dec!(0.015));
        prop_assert!(schedule.final_payment <= share_of(total, fin) + dec!(0.015));
    }

    #[test]
    fn share_of_stays_within_the_amount(
        amount in money(),
        pct in (0i64..=10_000).prop_map(|p| Decimal::new(p, 2)),
    ) {
        let share = share_of(amount, pct);

        prop_assert!(share >= Decimal::ZERO);
        prop_assert!(share <= amount);
        prop_assert!(share.scale() <= 2);
    }

    #[test]
    fn share_of_is_monotonic_in_the_percentage(
        amount in money(),
        a in 0i64..=10_000,
        b in 0i64..=10_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            share_of(amount, Decimal::new(lo, 2)) <= share_of(amount, Decimal::new(hi, 2))
        );
    }

    #[test]
    fn expiry_rewrites_open_statuses_only(
        status in select(QuoteStatus::iter().collect::<Vec<_>>()),
        offset_secs in -86_400i64..=86_400,
    ) {
        let mut quote = quote_with(dec!(1000.00), dec!(40), dec!(40), dec!(20));
        quote.status = status;
        let now = quote.valid_until + Duration::seconds(offset_secs);

        let effective = quote.effective_status(now);
        if status.is_open() && offset_secs > 0 {
            prop_assert_eq!(effective, QuoteStatus::Expired);
        } else {
            prop_assert_eq!(effective, status);
        }
    }
}
