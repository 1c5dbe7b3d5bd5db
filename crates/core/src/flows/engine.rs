use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{
    ContentState, ConversationAction, ConversationEvent, ConversationState, TransitionOutcome,
    TurnContext,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> ConversationState;
    fn transition(
        &self,
        current: &ConversationState,
        event: &ConversationEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Question loop, recommendation and clarification turns until the caller
/// concludes the consultation.
#[derive(Clone, Debug, Default)]
pub struct ConsultationFlow;

impl FlowDefinition for ConsultationFlow {
    fn initial_state(&self) -> ConversationState {
        ConversationState::NotStarted
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &ConversationEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_consultation(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> ConversationState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationState,
        event: &ConversationEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationState,
        event: &ConversationEvent,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event(
                            "conversation.transition_applied",
                            AuditCategory::Conversation,
                            AuditOutcome::Success,
                        )
                        .with_metadata("from", outcome.from.label())
                        .with_metadata("to", outcome.to.label())
                        .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event(
                            "conversation.transition_rejected",
                            AuditCategory::Conversation,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ConsultationFlow> {
    fn default() -> Self {
        Self::new(ConsultationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationState, event: ConversationEvent },
}

fn transition_consultation(
    current: &ConversationState,
    event: &ConversationEvent,
    context: &TurnContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationAction::{
        AppendFallbackTurn, AppendOracleTurn, AppendUserTurn, ApplyDelta, CloseConsultation,
        RequestOracle,
    };
    use ConversationEvent::{Conclude, OracleFailed, OracleReplied, Start, UserMessage};
    use ConversationState::{AwaitingOracle, Clarifying, Concluded, NotStarted};

    let invalid = || FlowTransitionError::InvalidTransition { state: *current, event: event.clone() };

    let (to, actions) = match (current, event) {
        (NotStarted, Start) => {
            (AwaitingOracle { prior: None }, vec![RequestOracle { opening: true }])
        }
        (state, UserMessage) if state.content().is_some() => (
            AwaitingOracle { prior: state.content() },
            vec![AppendUserTurn, RequestOracle { opening: false }],
        ),
        (AwaitingOracle { .. }, OracleReplied(conversation_type)) => {
            let to = ConversationState::from(ContentState::for_reply(*conversation_type));
            let actions = if context.actionable_delta {
                vec![ApplyDelta, AppendOracleTurn]
            } else {
                vec![AppendOracleTurn]
            };
            (to, actions)
        }
        (AwaitingOracle { prior }, OracleFailed) => {
            (prior.map_or(Clarifying, ConversationState::from), vec![AppendFallbackTurn])
        }
        (AwaitingOracle { .. } | Concluded, Conclude) => return Err(invalid()),
        (_, Conclude) => (Concluded, vec![CloseConsultation]),
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::conversation::ConversationType;
    use crate::domain::session::SessionId;
    use crate::flows::engine::{ConsultationFlow, FlowDefinition, FlowEngine, FlowTransitionError};
    use crate::flows::states::{
        ContentState, ConversationAction, ConversationEvent, ConversationState, TurnContext,
    };

    #[test]
    fn opening_question_then_recommendation_with_delta() {
        let engine = FlowEngine::new(ConsultationFlow);
        let context = TurnContext::default();

        let started = engine
            .apply(&engine.initial_state(), &ConversationEvent::Start, &context)
            .expect("not started -> awaiting");
        assert_eq!(started.to, ConversationState::AwaitingOracle { prior: None });
        assert_eq!(started.actions, vec![ConversationAction::RequestOracle { opening: true }]);

        let asking = engine
            .apply(
                &started.to,
                &ConversationEvent::OracleReplied(ConversationType::Question),
                &context,
            )
            .expect("awaiting -> asking");
        assert_eq!(asking.to, ConversationState::AskingQuestion);
        assert_eq!(asking.actions, vec![ConversationAction::AppendOracleTurn]);

        let awaiting = engine
            .apply(&asking.to, &ConversationEvent::UserMessage, &context)
            .expect("asking -> awaiting");
        assert_eq!(
            awaiting.to,
            ConversationState::AwaitingOracle { prior: Some(ContentState::AskingQuestion) }
        );
        assert_eq!(
            awaiting.actions,
            vec![
                ConversationAction::AppendUserTurn,
                ConversationAction::RequestOracle { opening: false }
            ]
        );

        let recommending = engine
            .apply(
                &awaiting.to,
                &ConversationEvent::OracleReplied(ConversationType::Recommendation),
                &TurnContext { actionable_delta: true },
            )
            .expect("awaiting -> recommending");
        assert_eq!(recommending.to, ConversationState::Recommending);
        assert_eq!(
            recommending.actions,
            vec![ConversationAction::ApplyDelta, ConversationAction::AppendOracleTurn]
        );
    }

    #[test]
    fn quote_update_reply_lands_in_recommending() {
        let outcome = ConsultationFlow
            .transition(
                &ConversationState::AwaitingOracle { prior: Some(ContentState::Clarifying) },
                &ConversationEvent::OracleReplied(ConversationType::QuoteUpdate),
                &TurnContext { actionable_delta: true },
            )
            .expect("quote update reply");
        assert_eq!(outcome.to, ConversationState::Recommending);
    }

    #[test]
    fn every_reply_type_entering_recommending_carries_its_delta() {
        for conversation_type in [
            ConversationType::Question,
            ConversationType::Recommendation,
            ConversationType::Clarification,
            ConversationType::QuoteUpdate,
        ] {
            let recommending =
                ContentState::for_reply(conversation_type) == ContentState::Recommending;
            assert_eq!(recommending, conversation_type.proposes_quote(), "{conversation_type:?}");
        }
    }

    #[test]
    fn oracle_failure_restores_prior_content_state() {
        let engine = FlowEngine::default();
        let restored = engine
            .apply(
                &ConversationState::AwaitingOracle { prior: Some(ContentState::Recommending) },
                &ConversationEvent::OracleFailed,
                &TurnContext::default(),
            )
            .expect("failure is recoverable");
        assert_eq!(restored.to, ConversationState::Recommending);
        assert_eq!(restored.actions, vec![ConversationAction::AppendFallbackTurn]);

        let opening = engine
            .apply(
                &ConversationState::AwaitingOracle { prior: None },
                &ConversationEvent::OracleFailed,
                &TurnContext::default(),
            )
            .expect("opening failure is recoverable");
        assert_eq!(opening.to, ConversationState::Clarifying);
    }

    #[test]
    fn concluded_is_terminal_and_explicit() {
        let engine = FlowEngine::default();
        let concluded = engine
            .apply(
                &ConversationState::Recommending,
                &ConversationEvent::Conclude,
                &TurnContext::default(),
            )
            .expect("explicit conclude");
        assert_eq!(concluded.to, ConversationState::Concluded);

        let error = engine
            .apply(&concluded.to, &ConversationEvent::UserMessage, &TurnContext::default())
            .expect_err("no messages after conclusion");
        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: ConversationState::Concluded,
                event: ConversationEvent::UserMessage
            }
        ));
    }

    #[test]
    fn messages_are_rejected_before_start_and_while_awaiting() {
        let engine = FlowEngine::default();
        for state in
            [ConversationState::NotStarted, ConversationState::AwaitingOracle { prior: None }]
        {
            assert!(engine
                .apply(&state, &ConversationEvent::UserMessage, &TurnContext::default())
                .is_err());
        }
        assert!(engine
            .apply(&ConversationState::AskingQuestion, &ConversationEvent::Start, &TurnContext::default())
            .is_err());
    }

    #[test]
    fn transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &ConversationState::NotStarted,
                &ConversationEvent::Start,
                &TurnContext::default(),
                &sink,
                &AuditContext::new(Some(SessionId::new("session_42")), "req-42", "session-actor"),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "conversation.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("awaiting_oracle"));
    }
}
