use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::quote::LedgerItem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

pub trait PricingEngine: Send + Sync {
    fn totals(&self, items: &[LedgerItem]) -> LedgerTotals;
}

/// Flat sales tax applied to the subtotal, rounded to cents. Every price
/// and total is expressed in `currency`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaxRatePricing {
    tax_rate: Decimal,
    currency: String,
}

impl TaxRatePricing {
    pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
    pub const DEFAULT_CURRENCY: &'static str = "USD";

    pub fn new(tax_rate: Decimal) -> Self {
        Self { tax_rate, currency: Self::DEFAULT_CURRENCY.to_owned() }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl Default for TaxRatePricing {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TAX_RATE)
    }
}

impl PricingEngine for TaxRatePricing {
    fn totals(&self, items: &[LedgerItem]) -> LedgerTotals {
        let subtotal = subtotal(items);
        let tax = (subtotal * self.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        LedgerTotals { subtotal, tax, total: subtotal + tax }
    }
}

pub fn subtotal(items: &[LedgerItem]) -> Decimal {
    items.iter().map(LedgerItem::total_price).sum()
}
