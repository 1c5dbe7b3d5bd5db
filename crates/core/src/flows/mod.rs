pub mod engine;
pub mod states;

pub use engine::{ConsultationFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{
    ContentState, ConversationAction, ConversationEvent, ConversationState, TransitionOutcome,
    TurnContext,
};
