use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::equipment::EquipmentId;

/// Presentation hint describing what the most recent delta did to a line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessFlag {
    #[default]
    Unset,
    New,
    Updated,
}

/// One line of the live quote. The line total is always derived from
/// `unit_price * quantity` and is never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerItem {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub reasoning: Option<String>,
    pub installation_zone: Option<String>,
    pub freshness: FreshnessFlag,
}

impl LedgerItem {
    pub fn total_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Line identity is the equipment id plus the installation zone; a line
    /// without a zone only matches a reference without one.
    pub fn matches(&self, equipment_id: &EquipmentId, installation_zone: Option<&str>) -> bool {
        &self.equipment_id == equipment_id && self.installation_zone.as_deref() == installation_zone
    }
}

/// A full line proposed by an `add` or `replace` delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaLine {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub reasoning: Option<String>,
    pub installation_zone: Option<String>,
}

impl DeltaLine {
    pub fn into_item(self, freshness: FreshnessFlag) -> LedgerItem {
        LedgerItem {
            equipment_id: self.equipment_id,
            name: self.name,
            category: self.category,
            quantity: self.quantity,
            unit_price: self.unit_price,
            reasoning: self.reasoning,
            installation_zone: self.installation_zone,
            freshness,
        }
    }
}

/// The mutable fields an `update` delta may overwrite on an existing line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineAdjustment {
    pub equipment_id: EquipmentId,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
    pub reasoning: Option<String>,
    pub installation_zone: Option<String>,
}

/// Names the line(s) a `remove` delta deletes.
///
/// With a zone, only that zone's line goes. Without one, the zone-less line
/// goes if there is one; otherwise every line of the equipment does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "LineRefRepr")]
pub struct LineRef {
    pub equipment_id: EquipmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_zone: Option<String>,
}

impl LineRef {
    pub fn new(equipment_id: EquipmentId) -> Self {
        Self { equipment_id, installation_zone: None }
    }

    pub fn in_zone(mut self, installation_zone: Option<String>) -> Self {
        self.installation_zone = installation_zone;
        self
    }
}

/// Removal entries arrive either as a bare id or as an item-shaped object.
#[derive(Deserialize)]
#[serde(untagged)]
enum LineRefRepr {
    Id(EquipmentId),
    #[serde(rename_all = "camelCase")]
    Line {
        equipment_id: EquipmentId,
        #[serde(default)]
        installation_zone: Option<String>,
    },
}

impl From<LineRefRepr> for LineRef {
    fn from(repr: LineRefRepr) -> Self {
        match repr {
            LineRefRepr::Id(equipment_id) => Self::new(equipment_id),
            LineRefRepr::Line { equipment_id, installation_zone } => {
                Self { equipment_id, installation_zone }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "items", rename_all = "snake_case")]
pub enum DeltaAction {
    Add(Vec<DeltaLine>),
    Replace(Vec<DeltaLine>),
    Update(Vec<LineAdjustment>),
    Remove(Vec<LineRef>),
}

impl DeltaAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Replace(_) => "replace",
            Self::Update(_) => "update",
            Self::Remove(_) => "remove",
        }
    }

    pub fn equipment_ids(&self) -> Vec<&EquipmentId> {
        match self {
            Self::Add(lines) | Self::Replace(lines) => {
                lines.iter().map(|line| &line.equipment_id).collect()
            }
            Self::Update(adjustments) => {
                adjustments.iter().map(|adjustment| &adjustment.equipment_id).collect()
            }
            Self::Remove(lines) => lines.iter().map(|line| &line.equipment_id).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Add(lines) | Self::Replace(lines) => lines.len(),
            Self::Update(adjustments) => adjustments.len(),
            Self::Remove(lines) => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A structured instruction to mutate the ledger. Consumed immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteDelta {
    #[serde(flatten)]
    pub action: DeltaAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuoteDelta {
    pub fn new(action: DeltaAction) -> Self {
        Self { action, explanation: None }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{DeltaAction, DeltaLine, FreshnessFlag, LedgerItem, LineRef, QuoteDelta};
    use crate::domain::equipment::EquipmentId;

    fn line(id: &str, zone: Option<&str>) -> LedgerItem {
        DeltaLine {
            equipment_id: EquipmentId::new(id),
            name: "Shure SM58".to_owned(),
            category: "Microphones".to_owned(),
            quantity: 3,
            unit_price: Decimal::new(12_950, 2),
            reasoning: None,
            installation_zone: zone.map(str::to_owned),
        }
        .into_item(FreshnessFlag::New)
    }

    #[test]
    fn total_price_is_derived_from_quantity() {
        assert_eq!(line("mic-1", None).total_price(), Decimal::new(38_850, 2));
    }

    #[test]
    fn zones_are_matched_exactly() {
        let zoned = line("mic-1", Some("dining"));
        let unzoned = line("mic-1", None);
        let id = EquipmentId::new("mic-1");

        assert!(!zoned.matches(&id, None));
        assert!(zoned.matches(&id, Some("dining")));
        assert!(!zoned.matches(&id, Some("outdoor")));
        assert!(unzoned.matches(&id, None));
        assert!(!unzoned.matches(&id, Some("dining")));
        assert!(!unzoned.matches(&EquipmentId::new("mic-2"), None));
    }

    #[test]
    fn removal_entries_accept_bare_ids_and_zoned_lines() {
        let delta: QuoteDelta = serde_json::from_value(json!({
            "action": "remove",
            "items": ["eq-1", {"equipmentId": "eq-2", "installationZone": "patio", "quantity": 1}]
        }))
        .expect("remove delta");

        assert_eq!(
            delta.action,
            DeltaAction::Remove(vec![
                LineRef::new(EquipmentId::new("eq-1")),
                LineRef::new(EquipmentId::new("eq-2")).in_zone(Some("patio".to_owned())),
            ])
        );
    }

    #[test]
    fn delta_serializes_as_tagged_action_with_items() {
        let removal = LineRef::new(EquipmentId::new("eq-1"));
        let delta = QuoteDelta::new(DeltaAction::Remove(vec![removal]))
            .with_explanation("customer dropped the sub");

        let value = serde_json::to_value(&delta).expect("serialize delta");
        assert_eq!(
            value,
            json!({
                "action": "remove",
                "items": [{"equipmentId": "eq-1"}],
                "explanation": "customer dropped the sub"
            })
        );
        assert_eq!(delta.action.name(), "remove");
    }
}
