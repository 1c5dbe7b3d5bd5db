use chrono::{DateTime, Utc};
use livequote_core::audit::{AuditContext, AuditSink};
use livequote_core::flows::{
    ConsultationFlow, ConversationEvent, FlowTransitionError, TransitionOutcome, TurnContext,
};
use livequote_core::{
    CatalogSnapshot, ClientInfo, ConsultationContext, ConversationState, ConversationTurn,
    DeltaAction, DeltaLine, EquipmentId, FlowEngine, LedgerError, LedgerSnapshot,
    LineAdjustment, LiveQuoteLedger, QuoteDelta, SessionId, TurnRole,
};
use serde::Serialize;

use crate::oracle::OracleRequest;

/// One customer's consultation: the ledger and turn history it owns
/// exclusively, plus the catalog snapshot taken when it was created.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    context: ConsultationContext,
    catalog: CatalogSnapshot,
    ledger: LiveQuoteLedger,
    turns: Vec<ConversationTurn>,
    state: ConversationState,
    has_recommendations: bool,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub state: &'static str,
    pub has_recommendations: bool,
    pub turn_count: usize,
    pub quote: LedgerSnapshot,
    /// Client details captured before the consultation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: SessionId,
        context: ConsultationContext,
        catalog: CatalogSnapshot,
        ledger: LiveQuoteLedger,
    ) -> Self {
        Self {
            id,
            context,
            catalog,
            ledger,
            turns: Vec::new(),
            state: ConversationState::NotStarted,
            has_recommendations: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn context(&self) -> &ConsultationContext {
        &self.context
    }

    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    pub fn ledger(&self) -> &LiveQuoteLedger {
        &self.ledger
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn has_recommendations(&self) -> bool {
        self.has_recommendations
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            state: self.state.label(),
            has_recommendations: self.has_recommendations,
            turn_count: self.turns.len(),
            quote: self.ledger.snapshot(),
            client_info: self.context.client_info.clone(),
            created_at: self.created_at,
        }
    }

    pub fn oracle_request(&self) -> OracleRequest {
        OracleRequest {
            context: self.context.clone(),
            catalog: self.catalog.clone(),
            turns: self.turns.clone(),
            ledger: self.ledger.clone(),
        }
    }

    pub fn transition<S>(
        &mut self,
        engine: &FlowEngine<ConsultationFlow>,
        event: ConversationEvent,
        context: TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let outcome = engine.apply_with_audit(&self.state, &event, &context, sink, audit)?;
        self.state = outcome.to;
        Ok(outcome)
    }

    /// Merges `delta` into the ledger. Returns whether anything changed;
    /// on error the ledger is untouched.
    pub fn apply_delta<S>(
        &mut self,
        delta: &QuoteDelta,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<bool, LedgerError>
    where
        S: AuditSink + ?Sized,
    {
        let outcome = self.ledger.apply_with_audit(delta, Utc::now(), sink, audit)?;
        self.ledger = outcome.ledger;
        Ok(outcome.changed)
    }

    pub fn push_turn(&mut self, turn: ConversationTurn) {
        if turn.role == TurnRole::Oracle
            && turn.details.as_ref().is_some_and(|details| details.has_recommendations())
        {
            self.has_recommendations = true;
        }
        self.turns.push(turn);
    }

    pub fn mark_recommended(&mut self) {
        self.has_recommendations = true;
    }

    /// Checks a client-submitted delta against the catalog and reprices its
    /// lines from it. Clients never set prices, and never add equipment the
    /// catalog marks unavailable.
    pub fn catalog_priced(&self, delta: QuoteDelta) -> Result<QuoteDelta, LedgerError> {
        let unknown = |id: &EquipmentId| {
            LedgerError::InvalidDelta(format!("equipment {id} is not in the catalog"))
        };
        let price = |line: DeltaLine| -> Result<DeltaLine, LedgerError> {
            let equipment =
                self.catalog.find(&line.equipment_id).ok_or_else(|| unknown(&line.equipment_id))?;
            if !equipment.available {
                return Err(LedgerError::InvalidDelta(format!(
                    "equipment {} is not available",
                    line.equipment_id
                )));
            }
            Ok(DeltaLine {
                name: equipment.name.clone(),
                category: equipment.category.clone(),
                unit_price: equipment.base_price,
                ..line
            })
        };

        let action = match delta.action {
            DeltaAction::Add(lines) => {
                DeltaAction::Add(lines.into_iter().map(price).collect::<Result<_, _>>()?)
            }
            DeltaAction::Replace(lines) => {
                DeltaAction::Replace(lines.into_iter().map(price).collect::<Result<_, _>>()?)
            }
            DeltaAction::Update(adjustments) => DeltaAction::Update(
                adjustments
                    .into_iter()
                    .map(|adjustment| LineAdjustment { unit_price: None, ..adjustment })
                    .collect(),
            ),
            DeltaAction::Remove(lines) => DeltaAction::Remove(lines),
        };
        Ok(QuoteDelta { action, explanation: delta.explanation })
    }
}
