//! Order domain — the order/customer snapshot and the lookup capability.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Immutable order + customer snapshot, fetched once per case.
///
/// The pipeline never writes this back; any mutation of order state
/// (e.g. flagging the return in the store) is an external concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: u64,
    /// Stock-keeping unit referenced in orders and policy text.
    pub product_id: String,
    pub customer_id: u64,
    pub quantity: u32,
    pub price: Decimal,
    pub currency: String,
    pub purchase_date: NaiveDate,
    /// Whether the order is already flagged as returned in the store.
    pub is_return_flagged: bool,
    pub customer_name: String,
    pub customer_email: String,
}

impl OrderRecord {
    /// Whole days elapsed between the purchase date and `today`.
    ///
    /// Negative when the purchase date lies in the future; callers treat
    /// that as ordinarily eligible rather than rejecting it.
    pub fn days_since_purchase(&self, today: NaiveDate) -> i64 {
        (today - self.purchase_date).num_days()
    }
}

/// Outcome of an order lookup.
///
/// "Not found" is a domain outcome, not an error — transport failures are
/// the `Err` side of the `fetch` result.
#[derive(Debug, Clone)]
pub enum OrderFetch {
    Found(OrderRecord),
    NotFound,
}

/// Capability interface over the order/customer store.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// Fetch the order + customer snapshot for `order_id`.
    async fn fetch(&self, order_id: u64) -> Result<OrderFetch, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(purchase: NaiveDate) -> OrderRecord {
        OrderRecord {
            order_id: 104,
            product_id: "SKU005".into(),
            customer_id: 7,
            quantity: 1,
            price: dec!(59.99),
            currency: "USD".into(),
            purchase_date: purchase,
            is_return_flagged: false,
            customer_name: "Priya".into(),
            customer_email: "priya@example.com".into(),
        }
    }

    #[test]
    fn days_since_purchase_counts_whole_days() {
        let purchased = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_eq!(record(purchased).days_since_purchase(today), 15);
    }

    #[test]
    fn days_since_purchase_negative_for_future_date() {
        let purchased = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert!(record(purchased).days_since_purchase(today) < 0);
    }
}
