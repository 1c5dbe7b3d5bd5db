//! Parse-then-validate boundary for oracle output.
//!
//! The completion service returns free text. Only the first balanced JSON
//! object in it is considered; every field is then checked against its
//! expected type. Anything missing or mistyped is a
//! [`OracleError::MalformedResponse`], never a silent default.

use livequote_core::{
    ConversationType, EquipmentId, LineAdjustment, LineRef, OracleDetails, Recommendation,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::oracle::OracleError;

/// A reply whose delta has not yet been checked against the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedReply {
    pub conversation_type: ConversationType,
    pub content: String,
    pub should_update_quote: bool,
    pub proposed: Option<ProposedDelta>,
    pub details: OracleDetails,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProposedDelta {
    pub action: ProposedAction,
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProposedAction {
    Add(Vec<ProposedLine>),
    Replace(Vec<ProposedLine>),
    Update(Vec<LineAdjustment>),
    Remove(Vec<LineRef>),
}

impl ProposedAction {
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
}

/// An `add`/`replace` line as the oracle wrote it. Name, category and price
/// are optional here because the catalog is authoritative for them.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedLine {
    pub equipment_id: EquipmentId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub installation_zone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    conversation_type: Option<String>,
    content: Option<String>,
    #[serde(default)]
    should_update_quote: Option<bool>,
    #[serde(default)]
    quote_updates: Option<RawDelta>,
    #[serde(default)]
    recommendations: Option<Vec<Recommendation>>,
    #[serde(default)]
    follow_up_questions: Option<Vec<String>>,
    #[serde(default)]
    purchase_benefits: Option<Vec<String>>,
    #[serde(default)]
    next_steps: Option<Vec<String>>,
    #[serde(default)]
    total_estimate: Option<Decimal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDelta {
    action: String,
    items: Vec<Value>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Returns the first balanced `{ ... }` span of `raw`, skipping braces that
/// appear inside JSON strings.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_reply(raw: &str) -> Result<ParsedReply, OracleError> {
    let span = extract_json_object(raw)
        .ok_or_else(|| malformed("response contains no JSON object"))?;
    let reply: RawReply = serde_json::from_str(span)
        .map_err(|error| malformed(format!("response JSON is invalid: {error}")))?;

    let conversation_type = match reply.conversation_type.as_deref() {
        None => return Err(malformed("missing conversationType")),
        Some(raw_type) => ConversationType::parse(raw_type)
            .ok_or_else(|| malformed(format!("unknown conversationType `{raw_type}`")))?,
    };
    let content = reply
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| malformed("missing content"))?;
    let proposed = reply.quote_updates.map(parse_delta).transpose()?;

    Ok(ParsedReply {
        conversation_type,
        content,
        should_update_quote: reply.should_update_quote.unwrap_or(false),
        proposed,
        details: OracleDetails {
            recommendations: reply.recommendations.unwrap_or_default(),
            follow_up_questions: reply.follow_up_questions.unwrap_or_default(),
            purchase_benefits: reply.purchase_benefits.unwrap_or_default(),
            next_steps: reply.next_steps.unwrap_or_default(),
            total_estimate: reply.total_estimate,
        },
    })
}

fn parse_delta(raw: RawDelta) -> Result<ProposedDelta, OracleError> {
    let action = match raw.action.as_str() {
        "add" => ProposedAction::Add(parse_items(raw.items)?),
        "replace" => ProposedAction::Replace(parse_items(raw.items)?),
        "update" => ProposedAction::Update(parse_items(raw.items)?),
        "remove" => ProposedAction::Remove(parse_items(raw.items)?),
        other => return Err(malformed(format!("unknown quoteUpdates action `{other}`"))),
    };

    let quantities_valid = match &action {
        ProposedAction::Add(lines) | ProposedAction::Replace(lines) => {
            lines.iter().all(|line| line.quantity > 0)
        }
        ProposedAction::Update(adjustments) => {
            adjustments.iter().all(|adjustment| adjustment.quantity > 0)
        }
        ProposedAction::Remove(_) => true,
    };
    if !quantities_valid {
        return Err(malformed("quoteUpdates item quantity must be at least 1"));
    }
    if action.equipment_ids().iter().any(|id| id.as_str().trim().is_empty()) {
        return Err(malformed("quoteUpdates item is missing equipmentId"));
    }

    Ok(ProposedDelta { action, explanation: raw.explanation })
}

fn parse_items<T>(items: Vec<Value>) -> Result<Vec<T>, OracleError>
where
    T: for<'de> Deserialize<'de>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|error| malformed(format!("quoteUpdates item {index}: {error}")))
        })
        .collect()
}

fn malformed(message: impl Into<String>) -> OracleError {
    OracleError::MalformedResponse(message.into())
}
