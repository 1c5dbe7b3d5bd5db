pub mod catalog;
pub mod pricing;

pub use catalog::CatalogSnapshot;
pub use pricing::{LedgerTotals, PricingEngine, TaxRatePricing};
