use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::cpq::pricing::{LedgerTotals, PricingEngine, TaxRatePricing};
use crate::domain::equipment::EquipmentId;
use crate::domain::quote::{
    DeltaAction, DeltaLine, FreshnessFlag, LedgerItem, LineAdjustment, LineRef, QuoteDelta,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid delta: {0}")]
    InvalidDelta(String),
}

/// The authoritative quote-in-progress for one session.
///
/// Merges are functional: [`LiveQuoteLedger::apply`] never mutates `self`
/// and returns the next state. Totals are derived from the items on every
/// read and are never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveQuoteLedger {
    items: Vec<LedgerItem>,
    revision: u64,
    last_updated: Option<DateTime<Utc>>,
    pricing: TaxRatePricing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    pub ledger: LiveQuoteLedger,
    /// False when the delta was valid but matched nothing; revision is unchanged.
    pub changed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItem {
    #[serde(flatten)]
    pub item: LedgerItem,
    pub total_price: Decimal,
}

/// Serializable view of a ledger, broadcast as `quote_update` data and
/// handed to the inventory service on finalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub items: Vec<SnapshotItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub tax_rate: Decimal,
    /// ISO 4217 code every price in the snapshot is expressed in.
    pub currency: String,
    pub revision: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for LiveQuoteLedger {
    fn default() -> Self {
        Self::new(TaxRatePricing::default())
    }
}

impl LiveQuoteLedger {
    pub fn new(pricing: TaxRatePricing) -> Self {
        Self { items: Vec::new(), revision: 0, last_updated: None, pricing }
    }

    pub fn items(&self) -> &[LedgerItem] {
        &self.items
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn totals(&self) -> LedgerTotals {
        self.pricing.totals(&self.items)
    }

    pub fn currency(&self) -> &str {
        self.pricing.currency()
    }

    pub fn find(
        &self,
        equipment_id: &EquipmentId,
        installation_zone: Option<&str>,
    ) -> Option<&LedgerItem> {
        self.items.iter().find(|item| item.matches(equipment_id, installation_zone))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let totals = self.totals();
        LedgerSnapshot {
            items: self
                .items
                .iter()
                .map(|item| SnapshotItem { total_price: item.total_price(), item: item.clone() })
                .collect(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            tax_rate: self.pricing.tax_rate(),
            currency: self.pricing.currency().to_owned(),
            revision: self.revision,
            last_updated: self.last_updated,
        }
    }

    /// `Current Quote Total: $x` followed by one `name xN ($line)` entry per item.
    pub fn summary(&self) -> String {
        if self.items.is_empty() {
            return "No items in quote yet".to_owned();
        }
        let lines = self
            .items
            .iter()
            .map(|item| format!("- {} x{} (${})", item.name, item.quantity, item.total_price()))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Current Quote Total: ${}\nItems:\n{lines}", self.totals().total)
    }

    /// Applies `delta` atomically. An invalid line rejects the whole delta and
    /// leaves `self` untouched.
    pub fn apply(&self, delta: &QuoteDelta, at: DateTime<Utc>) -> Result<MergeOutcome, LedgerError> {
        validate(&delta.action)?;

        let mut items = self.items.clone();
        for item in &mut items {
            item.freshness = FreshnessFlag::Unset;
        }

        let changed = match &delta.action {
            DeltaAction::Add(lines) => {
                for line in lines {
                    merge_add(&mut items, line.clone());
                }
                true
            }
            DeltaAction::Replace(lines) => {
                items.clear();
                for line in lines {
                    merge_add(&mut items, line.clone());
                }
                true
            }
            DeltaAction::Update(adjustments) => {
                let mut matched = false;
                for adjustment in adjustments {
                    matched |= merge_update(&mut items, adjustment);
                }
                matched
            }
            DeltaAction::Remove(lines) => {
                let before = items.len();
                for line in lines {
                    remove_line(&mut items, line);
                }
                items.len() != before
            }
        };

        if !changed {
            return Ok(MergeOutcome { ledger: self.clone(), changed: false });
        }

        Ok(MergeOutcome {
            ledger: Self {
                items,
                revision: self.revision + 1,
                last_updated: Some(at),
                pricing: self.pricing.clone(),
            },
            changed: true,
        })
    }

    pub fn apply_with_audit<S>(
        &self,
        delta: &QuoteDelta,
        at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<MergeOutcome, LedgerError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(delta, at);
        let event = match &result {
            Ok(outcome) => audit
                .event("ledger.delta_applied", AuditCategory::Ledger, AuditOutcome::Success)
                .with_metadata("action", delta.action.name())
                .with_metadata("changed", outcome.changed.to_string())
                .with_metadata("revision", outcome.ledger.revision.to_string())
                .with_metadata("total", outcome.ledger.totals().total.to_string()),
            Err(error) => audit
                .event("ledger.delta_rejected", AuditCategory::Ledger, AuditOutcome::Rejected)
                .with_metadata("action", delta.action.name())
                .with_metadata("error", error.to_string()),
        };
        sink.emit(event);
        result
    }

    /// Translates a manual `+/-` quantity change on the line identified by
    /// `(equipment_id, installation_zone)` into a single-line delta: an
    /// update, or a remove of that line once its quantity would drop to zero.
    pub fn quantity_change_delta(
        &self,
        equipment_id: &EquipmentId,
        installation_zone: Option<&str>,
        change: i64,
    ) -> Result<QuoteDelta, LedgerError> {
        if change == 0 {
            return Err(LedgerError::InvalidDelta("quantity change must be non-zero".to_owned()));
        }
        let item = self.find(equipment_id, installation_zone).ok_or_else(|| {
            let zone =
                installation_zone.map(|zone| format!(" in zone `{zone}`")).unwrap_or_default();
            LedgerError::InvalidDelta(format!("equipment {equipment_id}{zone} is not in the quote"))
        })?;

        let next = i64::from(item.quantity).saturating_add(change);
        let action = if next <= 0 {
            DeltaAction::Remove(vec![
                LineRef::new(equipment_id.clone()).in_zone(item.installation_zone.clone())
            ])
        } else {
            let quantity = u32::try_from(next).map_err(|_| {
                LedgerError::InvalidDelta(format!("quantity {next} is out of range"))
            })?;
            DeltaAction::Update(vec![LineAdjustment {
                equipment_id: equipment_id.clone(),
                quantity,
                unit_price: None,
                reasoning: None,
                installation_zone: item.installation_zone.clone(),
            }])
        };
        Ok(QuoteDelta::new(action))
    }
}

fn validate(action: &DeltaAction) -> Result<(), LedgerError> {
    if action.is_empty() && !matches!(action, DeltaAction::Replace(_)) {
        return Err(LedgerError::InvalidDelta(format!("{} delta has no items", action.name())));
    }
    if action.equipment_ids().iter().any(|id| id.as_str().trim().is_empty()) {
        return Err(LedgerError::InvalidDelta("missing equipmentId".to_owned()));
    }

    match action {
        DeltaAction::Add(lines) | DeltaAction::Replace(lines) => lines.iter().try_for_each(|line| {
            check_line(&line.equipment_id, line.quantity, Some(line.unit_price))
        }),
        DeltaAction::Update(adjustments) => adjustments.iter().try_for_each(|adjustment| {
            check_line(&adjustment.equipment_id, adjustment.quantity, adjustment.unit_price)
        }),
        DeltaAction::Remove(_) => Ok(()),
    }
}

fn check_line(
    equipment_id: &EquipmentId,
    quantity: u32,
    unit_price: Option<Decimal>,
) -> Result<(), LedgerError> {
    if quantity == 0 {
        return Err(LedgerError::InvalidDelta(format!(
            "quantity for {equipment_id} must be positive"
        )));
    }
    if unit_price.is_some_and(|price| price < Decimal::ZERO) {
        return Err(LedgerError::InvalidDelta(format!(
            "unit price for {equipment_id} must not be negative"
        )));
    }
    Ok(())
}

fn merge_add(items: &mut Vec<LedgerItem>, line: DeltaLine) {
    let existing = items
        .iter_mut()
        .find(|item| item.matches(&line.equipment_id, line.installation_zone.as_deref()));

    match existing {
        Some(item) => {
            item.quantity = item.quantity.saturating_add(line.quantity);
            if item.freshness != FreshnessFlag::New {
                item.freshness = FreshnessFlag::Updated;
            }
        }
        None => items.push(line.into_item(FreshnessFlag::New)),
    }
}

fn remove_line(items: &mut Vec<LedgerItem>, line: &LineRef) {
    let zone = line.installation_zone.as_deref();
    let exact = items.iter().any(|item| item.matches(&line.equipment_id, zone));
    if exact || zone.is_some() {
        items.retain(|item| !item.matches(&line.equipment_id, zone));
    } else {
        items.retain(|item| item.equipment_id != line.equipment_id);
    }
}

fn merge_update(items: &mut [LedgerItem], adjustment: &LineAdjustment) -> bool {
    let Some(item) = items
        .iter_mut()
        .find(|item| item.matches(&adjustment.equipment_id, adjustment.installation_zone.as_deref()))
    else {
        return false;
    };

    item.quantity = adjustment.quantity;
    if let Some(unit_price) = adjustment.unit_price {
        item.unit_price = unit_price;
    }
    if let Some(reasoning) = &adjustment.reasoning {
        item.reasoning = Some(reasoning.clone());
    }
    item.freshness = FreshnessFlag::Updated;
    true
}
