use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentId(pub String);

impl EquipmentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A purchasable item as listed by the inventory service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub category: String,
    pub base_price: Decimal,
    pub power_rating: Option<u32>,
    pub specifications: Option<serde_json::Value>,
    pub available: bool,
}

impl Equipment {
    /// One catalog line as the oracle sees it:
    /// `name (category) - $price[, powerW][, Features: {...}] [id: <id>]`.
    /// The bracketed id is what quote updates must reference.
    pub fn describe(&self) -> String {
        let mut line = format!("{} ({}) - ${}", self.name, self.category, self.base_price.normalize());
        if let Some(power_rating) = self.power_rating {
            line.push_str(&format!(", {power_rating}W"));
        }
        if let Some(specifications) = self.specifications.as_ref().filter(|specs| !specs.is_null()) {
            line.push_str(&format!(", Features: {specifications}"));
        }
        line.push_str(&format!(" [id: {}]", self.id));
        line
    }
}
