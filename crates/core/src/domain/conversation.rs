use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::equipment::EquipmentId;
use crate::domain::quote::QuoteDelta;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Oracle,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Question,
    Recommendation,
    Clarification,
    QuoteUpdate,
    Answer,
}

/// The content classification the oracle attaches to every reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Question,
    Recommendation,
    Clarification,
    QuoteUpdate,
}

impl ConversationType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "question" => Some(Self::Question),
            "recommendation" => Some(Self::Recommendation),
            "clarification" => Some(Self::Clarification),
            "quote_update" => Some(Self::QuoteUpdate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Recommendation => "recommendation",
            Self::Clarification => "clarification",
            Self::QuoteUpdate => "quote_update",
        }
    }

    /// Recommendation and quote-update replies move the conversation into
    /// `Recommending`, where any attached delta reaches the ledger.
    pub fn proposes_quote(self) -> bool {
        matches!(self, Self::Recommendation | Self::QuoteUpdate)
    }

    pub fn turn_kind(self) -> TurnKind {
        match self {
            Self::Question => TurnKind::Question,
            Self::Recommendation => TurnKind::Recommendation,
            Self::Clarification => TurnKind::Clarification,
            Self::QuoteUpdate => TurnKind::QuoteUpdate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedEquipment {
    pub id: EquipmentId,
    pub name: String,
    pub quantity: u32,
    pub installation_zone: Option<String>,
    pub reasoning: Option<String>,
    pub estimated_price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub category: String,
    pub equipment: Vec<RecommendedEquipment>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    pub installation_notes: Option<String>,
}

/// Advisory content of an oracle reply that never touches the ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purchase_benefits: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimate: Option<Decimal>,
}

impl OracleDetails {
    pub fn has_recommendations(&self) -> bool {
        !self.recommendations.is_empty()
    }
}

/// A validated oracle reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleReply {
    pub conversation_type: ConversationType,
    pub content: String,
    pub should_update_quote: bool,
    pub quote_updates: Option<QuoteDelta>,
    #[serde(flatten)]
    pub details: OracleDetails,
}

impl OracleReply {
    pub fn new(conversation_type: ConversationType, content: impl Into<String>) -> Self {
        Self {
            conversation_type,
            content: content.into(),
            should_update_quote: false,
            quote_updates: None,
            details: OracleDetails::default(),
        }
    }

    pub fn with_delta(mut self, delta: QuoteDelta) -> Self {
        self.should_update_quote = true;
        self.quote_updates = Some(delta);
        self
    }

    /// The delta the ledger should receive, if this reply mutates the quote.
    pub fn actionable_delta(&self) -> Option<&QuoteDelta> {
        let gated = self.should_update_quote || self.conversation_type.proposes_quote();
        self.quote_updates.as_ref().filter(|_| gated)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub kind: TurnKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_delta: Option<QuoteDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<OracleDetails>,
}

impl ConversationTurn {
    pub fn user_answer(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::User,
            kind: TurnKind::Answer,
            content: content.into(),
            timestamp,
            attached_delta: None,
            details: None,
        }
    }

    pub fn oracle(
        kind: TurnKind,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            role: TurnRole::Oracle,
            kind,
            content: content.into(),
            timestamp,
            attached_delta: None,
            details: None,
        }
    }

    pub fn with_delta(mut self, delta: Option<QuoteDelta>) -> Self {
        self.attached_delta = delta;
        self
    }

    pub fn with_details(mut self, details: OracleDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Transcript line as fed back to the oracle on follow-up calls.
    pub fn transcript_line(&self) -> String {
        let speaker = match self.role {
            TurnRole::Oracle => "Consultant",
            TurnRole::User => "Customer",
        };
        format!("{speaker}: {}", self.content)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ConversationTurn, ConversationType, OracleReply, TurnKind};
    use crate::domain::equipment::EquipmentId;
    use crate::domain::quote::{DeltaAction, LineRef, QuoteDelta};

    fn remove_delta() -> QuoteDelta {
        QuoteDelta::new(DeltaAction::Remove(vec![LineRef::new(EquipmentId::new("eq-1"))]))
    }

    #[test]
    fn conversation_type_round_trips_wire_names() {
        for raw in ["question", "recommendation", "clarification", "quote_update"] {
            let parsed = ConversationType::parse(raw).expect("known type");
            assert_eq!(parsed.as_str(), raw);
        }
        assert_eq!(ConversationType::parse("smalltalk"), None);
    }

    #[test]
    fn recommendation_delta_is_actionable_without_explicit_gate() {
        let mut reply = OracleReply::new(ConversationType::Recommendation, "Two K12.2s.");
        reply.quote_updates = Some(remove_delta());

        assert!(!reply.should_update_quote);
        assert!(reply.actionable_delta().is_some());
    }

    #[test]
    fn quote_update_delta_is_actionable_without_explicit_gate() {
        let mut reply = OracleReply::new(ConversationType::QuoteUpdate, "Dropped the sub.");
        reply.quote_updates = Some(remove_delta());

        assert!(!reply.should_update_quote);
        assert!(reply.actionable_delta().is_some());
    }

    #[test]
    fn question_delta_requires_should_update_gate() {
        let mut reply = OracleReply::new(ConversationType::Question, "How big is the room?");
        reply.quote_updates = Some(remove_delta());
        assert!(reply.actionable_delta().is_none());

        let gated = OracleReply::new(ConversationType::Question, "Dropped it.").with_delta(remove_delta());
        assert!(gated.actionable_delta().is_some());
    }

    #[test]
    fn transcript_lines_name_the_speaker() {
        let now = Utc::now();
        assert_eq!(
            ConversationTurn::user_answer("A cafe", now).transcript_line(),
            "Customer: A cafe"
        );
        assert_eq!(
            ConversationTurn::oracle(TurnKind::Question, "What size?", now).transcript_line(),
            "Consultant: What size?"
        );
    }
}
