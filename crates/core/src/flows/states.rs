use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationType;

/// States the dialogue settles in between oracle calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentState {
    AskingQuestion,
    Recommending,
    Clarifying,
}

impl ContentState {
    pub fn for_reply(conversation_type: ConversationType) -> Self {
        match conversation_type {
            ConversationType::Question => Self::AskingQuestion,
            ConversationType::Recommendation | ConversationType::QuoteUpdate => Self::Recommending,
            ConversationType::Clarification => Self::Clarifying,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    NotStarted,
    /// `prior` is the content state to fall back to if the oracle call fails.
    AwaitingOracle { prior: Option<ContentState> },
    AskingQuestion,
    Recommending,
    Clarifying,
    Concluded,
}

impl ConversationState {
    pub fn content(self) -> Option<ContentState> {
        match self {
            Self::AskingQuestion => Some(ContentState::AskingQuestion),
            Self::Recommending => Some(ContentState::Recommending),
            Self::Clarifying => Some(ContentState::Clarifying),
            Self::NotStarted | Self::AwaitingOracle { .. } | Self::Concluded => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::AwaitingOracle { .. } => "awaiting_oracle",
            Self::AskingQuestion => "asking_question",
            Self::Recommending => "recommending",
            Self::Clarifying => "clarifying",
            Self::Concluded => "concluded",
        }
    }
}

impl From<ContentState> for ConversationState {
    fn from(value: ContentState) -> Self {
        match value {
            ContentState::AskingQuestion => Self::AskingQuestion,
            ContentState::Recommending => Self::Recommending,
            ContentState::Clarifying => Self::Clarifying,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    Start,
    UserMessage,
    OracleReplied(ConversationType),
    OracleFailed,
    Conclude,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnContext {
    /// Whether the oracle reply carries a delta gated for the ledger.
    pub actionable_delta: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationAction {
    AppendUserTurn,
    RequestOracle { opening: bool },
    ApplyDelta,
    AppendOracleTurn,
    AppendFallbackTurn,
    CloseConsultation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: ConversationEvent,
    pub actions: Vec<ConversationAction>,
}
