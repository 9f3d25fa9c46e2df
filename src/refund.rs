//! Refund computation — strict price pass-through.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::OrderRecord;
use crate::policy::EligibilityVerdict;

/// Amount and currency to refund for an eligible return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDecision {
    pub amount: Decimal,
    pub currency: String,
}

/// Compute the refund for a verdict. Absent when ineligible.
///
/// The amount is the order's price in the order's currency, untouched —
/// no rounding, no conversion. A price discrepancy is an upstream
/// data-quality issue, not handled here.
pub fn compute(order: &OrderRecord, verdict: &EligibilityVerdict) -> Option<RefundDecision> {
    verdict.eligible.then(|| RefundDecision {
        amount: order.price,
        currency: order.currency.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ResolutionPath;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn order(price: Decimal, currency: &str) -> OrderRecord {
        OrderRecord {
            order_id: 104,
            product_id: "SKU005".into(),
            customer_id: 7,
            quantity: 2,
            price,
            currency: currency.into(),
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            is_return_flagged: false,
            customer_name: "Priya".into(),
            customer_email: "priya@example.com".into(),
        }
    }

    fn verdict(eligible: bool) -> EligibilityVerdict {
        EligibilityVerdict {
            eligible,
            reason: "test".into(),
            source_days: Some(20),
            resolution: ResolutionPath::ExactSkuMatch,
        }
    }

    #[test]
    fn eligible_passes_price_through_unmodified() {
        let refund = compute(&order(dec!(59.99), "USD"), &verdict(true)).unwrap();
        assert_eq!(refund.amount, dec!(59.99));
        assert_eq!(refund.currency, "USD");
    }

    #[test]
    fn ineligible_yields_no_refund() {
        assert!(compute(&order(dec!(59.99), "USD"), &verdict(false)).is_none());
    }

    #[test]
    fn quantity_does_not_scale_the_amount() {
        // Price is the stored order price; no per-unit arithmetic happens here.
        let refund = compute(&order(dec!(10.00), "EUR"), &verdict(true)).unwrap();
        assert_eq!(refund.amount, dec!(10.00));
        assert_eq!(refund.currency, "EUR");
    }
}
