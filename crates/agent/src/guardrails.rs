use livequote_core::{
    CatalogSnapshot, DeltaAction, DeltaLine, Equipment, EquipmentId, LineAdjustment, QuoteDelta,
};
use tracing::warn;

use crate::oracle::OracleError;
use crate::response::{ProposedAction, ProposedDelta, ProposedLine};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    /// The delta references something the catalog cannot back.
    Deny { reason_code: &'static str, equipment_id: EquipmentId },
    /// The delta is usable once oracle-supplied prices are replaced.
    Degrade { reason_code: &'static str, overridden: Vec<EquipmentId> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_set_prices: bool,
}

impl GuardrailPolicy {
    pub fn evaluate(&self, proposed: &ProposedDelta, catalog: &CatalogSnapshot) -> GuardrailDecision {
        let removing = matches!(proposed.action, ProposedAction::Remove(_));
        for equipment_id in proposed.action.equipment_ids() {
            match catalog.find(equipment_id) {
                None => {
                    return GuardrailDecision::Deny {
                        reason_code: "unknown_equipment",
                        equipment_id: equipment_id.clone(),
                    }
                }
                Some(equipment) if !equipment.available && !removing => {
                    return GuardrailDecision::Deny {
                        reason_code: "unavailable_equipment",
                        equipment_id: equipment_id.clone(),
                    }
                }
                Some(_) => {}
            }
        }

        if self.llm_can_set_prices {
            return GuardrailDecision::Allow;
        }
        let overridden = price_overrides(&proposed.action, catalog);
        if overridden.is_empty() {
            GuardrailDecision::Allow
        } else {
            GuardrailDecision::Degrade { reason_code: "price_override_ignored", overridden }
        }
    }

    /// Turns an oracle proposal into a ledger delta priced from the catalog.
    /// Any reference the catalog cannot back rejects the whole delta.
    pub fn resolve(
        &self,
        proposed: ProposedDelta,
        catalog: &CatalogSnapshot,
    ) -> Result<QuoteDelta, OracleError> {
        match self.evaluate(&proposed, catalog) {
            GuardrailDecision::Deny { reason_code, equipment_id } => {
                return Err(OracleError::InvalidReference { equipment_id, reason_code });
            }
            GuardrailDecision::Degrade { reason_code, overridden } => {
                warn!(
                    event_name = "oracle.guardrail.degraded",
                    reason_code,
                    overridden = ?overridden,
                    "oracle prices replaced with catalog prices"
                );
            }
            GuardrailDecision::Allow => {}
        }

        let action = match proposed.action {
            ProposedAction::Add(lines) => DeltaAction::Add(self.price_lines(lines, catalog)?),
            ProposedAction::Replace(lines) => {
                DeltaAction::Replace(self.price_lines(lines, catalog)?)
            }
            ProposedAction::Update(adjustments) => DeltaAction::Update(
                adjustments
                    .into_iter()
                    .map(|adjustment| LineAdjustment {
                        unit_price: adjustment.unit_price.filter(|_| self.llm_can_set_prices),
                        ..adjustment
                    })
                    .collect(),
            ),
            ProposedAction::Remove(lines) => DeltaAction::Remove(lines),
        };
        Ok(QuoteDelta { action, explanation: proposed.explanation })
    }

    fn price_lines(
        &self,
        lines: Vec<ProposedLine>,
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<DeltaLine>, OracleError> {
        lines
            .into_iter()
            .map(|line| {
                let equipment = catalog.find(&line.equipment_id).ok_or_else(|| {
                    OracleError::InvalidReference {
                        equipment_id: line.equipment_id.clone(),
                        reason_code: "unknown_equipment",
                    }
                })?;
                Ok(self.price_line(line, equipment))
            })
            .collect()
    }

    fn price_line(&self, line: ProposedLine, equipment: &Equipment) -> DeltaLine {
        let (name, category, unit_price) = if self.llm_can_set_prices {
            (
                line.name.unwrap_or_else(|| equipment.name.clone()),
                line.category.unwrap_or_else(|| equipment.category.clone()),
                line.unit_price.unwrap_or(equipment.base_price),
            )
        } else {
            (equipment.name.clone(), equipment.category.clone(), equipment.base_price)
        };
        DeltaLine {
            equipment_id: line.equipment_id,
            name,
            category,
            quantity: line.quantity,
            unit_price,
            reasoning: line.reasoning,
            installation_zone: line.installation_zone,
        }
    }
}

fn price_overrides(action: &ProposedAction, catalog: &CatalogSnapshot) -> Vec<EquipmentId> {
    let differs = |equipment_id: &EquipmentId, price: Option<rust_decimal::Decimal>| {
        match (price, catalog.find(equipment_id)) {
            (Some(price), Some(equipment)) => price != equipment.base_price,
            _ => false,
        }
    };
    match action {
        ProposedAction::Add(lines) | ProposedAction::Replace(lines) => lines
            .iter()
            .filter(|line| differs(&line.equipment_id, line.unit_price))
            .map(|line| line.equipment_id.clone())
            .collect(),
        ProposedAction::Update(adjustments) => adjustments
            .iter()
            .filter(|adjustment| adjustment.unit_price.is_some())
            .map(|adjustment| adjustment.equipment_id.clone())
            .collect(),
        ProposedAction::Remove(_) => Vec::new(),
    }
}
