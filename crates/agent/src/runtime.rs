use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use livequote_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use livequote_core::config::AppConfig;
use livequote_core::flows::{ConsultationFlow, ConversationAction, ConversationEvent, TurnContext};
use livequote_core::{
    ApplicationError, ClientInfo, ConsultationContext, ConversationTurn, ConversationType,
    DomainError, EquipmentId, FinalizeRequest, FinalizedQuote, FlowEngine, InventoryService,
    LedgerSnapshot, LiveQuoteLedger, OracleDetails, OracleReply, QuoteDelta, SessionId,
    TaxRatePricing, TurnKind,
};
use livequote_stream::{QuoteEvent, SessionRegistry};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::oracle::{OracleError, OracleRequest, RecommendationOracle};
use crate::session::{Session, SessionView};

const OPENING_FALLBACK: &str = "I'm sorry, I'm having a little trouble on my side right now. \
While I sort that out, could you tell me what the audio system will mainly be used for?";
const FOLLOW_UP_FALLBACK: &str =
    "Sorry, I didn't quite catch that. Could you tell me a bit more about what you need?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Upper bound for one oracle call; exceeding it counts as unavailable.
    pub oracle_timeout: Duration,
    pub queue_depth: usize,
    pub tax_rate: Decimal,
    pub currency: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(30),
            queue_depth: 64,
            tax_rate: TaxRatePricing::DEFAULT_TAX_RATE,
            currency: TaxRatePricing::DEFAULT_CURRENCY.to_owned(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            oracle_timeout: config.llm_timeout(),
            queue_depth: config.stream.session_queue_depth,
            tax_rate: config.quote.tax_rate,
            currency: config.quote.currency.clone(),
        }
    }
}

/// A stateless recommendation: the validated reply plus the quote its delta
/// produces on an empty ledger.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRecommendation {
    pub reply: OracleReply,
    pub proposed_quote: LedgerSnapshot,
}

/// Result of one conversational step, successful or degraded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub turn: ConversationTurn,
    pub state: &'static str,
    pub quote: LedgerSnapshot,
    pub quote_changed: bool,
    /// Set when the oracle failed and a fallback turn was appended instead.
    pub degraded_reason: Option<&'static str>,
}

/// A user-driven quote mutation. Both forms go through ledger validation.
#[derive(Clone, Debug, PartialEq)]
pub enum QuoteChange {
    /// `+/-` on the line identified by equipment id and installation zone.
    Quantity { equipment_id: EquipmentId, installation_zone: Option<String>, change: i64 },
    Delta(QuoteDelta),
}

type Reply<T> = oneshot::Sender<Result<T, ApplicationError>>;

enum SessionCommand {
    Start { reply: Reply<TurnOutcome> },
    Message { content: String, reply: Reply<TurnOutcome> },
    ChangeQuote { change: QuoteChange, reply: Reply<LedgerSnapshot> },
    Conclude { reply: Reply<SessionView> },
    View { reply: Reply<SessionView> },
    Transcript { reply: Reply<Vec<ConversationTurn>> },
    Resync { reply: Reply<LedgerSnapshot> },
    Finalize { client: ClientInfo, reply: Reply<FinalizedQuote> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteUpdatePayload<'a> {
    session_id: &'a SessionId,
    #[serde(flatten)]
    quote: &'a LedgerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AiResponsePayload<'a> {
    session_id: &'a SessionId,
    turn: &'a ConversationTurn,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded_reason: Option<&'static str>,
}

/// Owns one session and drains its commands one at a time.
struct SessionActor {
    session: Session,
    engine: FlowEngine<ConsultationFlow>,
    oracle: Arc<dyn RecommendationOracle>,
    registry: Arc<dyn SessionRegistry>,
    inventory: Arc<dyn InventoryService>,
    audit_sink: Arc<dyn AuditSink>,
    oracle_timeout: Duration,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        debug!(
            event_name = "session.actor.stopped",
            session_id = %self.session.id(),
            "session actor drained and stopped"
        );
    }

    async fn handle(&mut self, command: SessionCommand) {
        let audit = AuditContext::new(
            Some(self.session.id().clone()),
            Uuid::new_v4().to_string(),
            "session_actor",
        );
        // A caller that gave up waiting is not an error for the session.
        match command {
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.converse(ConversationEvent::Start, None, &audit).await);
            }
            SessionCommand::Message { content, reply } => {
                let result = self.converse(ConversationEvent::UserMessage, Some(content), &audit);
                let _ = reply.send(result.await);
            }
            SessionCommand::ChangeQuote { change, reply } => {
                let _ = reply.send(self.change_quote(change, &audit));
            }
            SessionCommand::Conclude { reply } => {
                let _ = reply.send(self.conclude(&audit));
            }
            SessionCommand::View { reply } => {
                let _ = reply.send(Ok(self.session.view()));
            }
            SessionCommand::Transcript { reply } => {
                let _ = reply.send(Ok(self.session.turns().to_vec()));
            }
            SessionCommand::Resync { reply } => {
                let snapshot = self.session.ledger().snapshot();
                self.publish_quote(&snapshot, None, &audit);
                let _ = reply.send(Ok(snapshot));
            }
            SessionCommand::Finalize { client, reply } => {
                let _ = reply.send(self.finalize(client, &audit).await);
            }
        }
    }

    async fn converse(
        &mut self,
        event: ConversationEvent,
        user_message: Option<String>,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, ApplicationError> {
        let opening = event == ConversationEvent::Start;
        let requested = self.session.transition(
            &self.engine,
            event,
            TurnContext::default(),
            &*self.audit_sink,
            audit,
        )?;
        if requested.actions.contains(&ConversationAction::AppendUserTurn) {
            if let Some(content) = user_message {
                self.session.push_turn(ConversationTurn::user_answer(content, Utc::now()));
            }
        }

        let request = self.session.oracle_request();
        let result =
            match tokio::time::timeout(self.oracle_timeout, self.oracle.recommend(&request)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Unavailable(format!(
                    "oracle call exceeded {}ms",
                    self.oracle_timeout.as_millis()
                ))),
            };

        match result {
            Ok(reply) => self.accept_reply(reply, opening, audit),
            Err(error) => self.degrade(error, opening, audit),
        }
    }

    fn accept_reply(
        &mut self,
        reply: OracleReply,
        opening: bool,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, ApplicationError> {
        let delta = reply.actionable_delta().cloned();
        if let Some(delta) = &delta {
            // Fail closed: a delta the ledger would reject is never half-trusted.
            if let Err(error) = self.session.ledger().apply(delta, Utc::now()) {
                return self.degrade(OracleError::MalformedResponse(error.to_string()), opening, audit);
            }
        }

        let outcome = self.session.transition(
            &self.engine,
            ConversationEvent::OracleReplied(reply.conversation_type),
            TurnContext { actionable_delta: delta.is_some() },
            &*self.audit_sink,
            audit,
        )?;

        let mut quote_changed = false;
        let mut appended = None;
        for action in &outcome.actions {
            match action {
                ConversationAction::ApplyDelta => {
                    if let Some(delta) = &delta {
                        quote_changed = self.session.apply_delta(delta, &*self.audit_sink, audit)?;
                    }
                }
                ConversationAction::AppendOracleTurn => {
                    let mut turn = ConversationTurn::oracle(
                        reply.conversation_type.turn_kind(),
                        reply.content.clone(),
                        Utc::now(),
                    )
                    .with_delta(delta.clone());
                    if reply.details != OracleDetails::default() {
                        turn = turn.with_details(reply.details.clone());
                    }
                    self.session.push_turn(turn.clone());
                    appended = Some(turn);
                }
                _ => {}
            }
        }
        if reply.conversation_type == ConversationType::Recommendation {
            self.session.mark_recommended();
        }

        let turn = appended.ok_or_else(|| {
            ApplicationError::from(DomainError::InvariantViolation(
                "oracle reply produced no turn".to_owned(),
            ))
        })?;
        let snapshot = self.session.ledger().snapshot();
        if quote_changed {
            let explanation = delta.as_ref().and_then(|delta| delta.explanation.as_deref());
            self.publish_quote(&snapshot, explanation, audit);
        }
        self.publish_turn(&turn, None, audit);

        info!(
            event_name = "session.turn.completed",
            session_id = %self.session.id(),
            correlation_id = %audit.correlation_id,
            conversation_type = reply.conversation_type.as_str(),
            state = self.session.state().label(),
            revision = snapshot.revision,
            quote_changed,
            "oracle turn applied"
        );

        Ok(TurnOutcome {
            turn,
            state: self.session.state().label(),
            quote: snapshot,
            quote_changed,
            degraded_reason: None,
        })
    }

    fn degrade(
        &mut self,
        error: OracleError,
        opening: bool,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, ApplicationError> {
        warn!(
            event_name = "session.oracle.degraded",
            session_id = %self.session.id(),
            correlation_id = %audit.correlation_id,
            reason_code = error.reason_code(),
            error = %error,
            "oracle call failed; appending fallback turn"
        );
        self.audit_sink.emit(
            audit
                .event("oracle.call_failed", AuditCategory::Oracle, AuditOutcome::Failed)
                .with_metadata("reason_code", error.reason_code())
                .with_metadata("error", error.to_string()),
        );

        self.session.transition(
            &self.engine,
            ConversationEvent::OracleFailed,
            TurnContext::default(),
            &*self.audit_sink,
            audit,
        )?;
        let content = if opening { OPENING_FALLBACK } else { FOLLOW_UP_FALLBACK };
        let turn = ConversationTurn::oracle(TurnKind::Clarification, content, Utc::now());
        self.session.push_turn(turn.clone());
        self.publish_turn(&turn, Some(error.reason_code()), audit);

        Ok(TurnOutcome {
            turn,
            state: self.session.state().label(),
            quote: self.session.ledger().snapshot(),
            quote_changed: false,
            degraded_reason: Some(error.reason_code()),
        })
    }

    fn change_quote(
        &mut self,
        change: QuoteChange,
        audit: &AuditContext,
    ) -> Result<LedgerSnapshot, ApplicationError> {
        let delta = match change {
            QuoteChange::Quantity { equipment_id, installation_zone, change } => self
                .session
                .ledger()
                .quantity_change_delta(&equipment_id, installation_zone.as_deref(), change)?,
            QuoteChange::Delta(delta) => self.session.catalog_priced(delta)?,
        };
        let changed = self.session.apply_delta(&delta, &*self.audit_sink, audit)?;
        let snapshot = self.session.ledger().snapshot();
        if changed {
            self.publish_quote(&snapshot, delta.explanation.as_deref(), audit);
        }
        Ok(snapshot)
    }

    fn conclude(&mut self, audit: &AuditContext) -> Result<SessionView, ApplicationError> {
        self.session.transition(
            &self.engine,
            ConversationEvent::Conclude,
            TurnContext::default(),
            &*self.audit_sink,
            audit,
        )?;
        info!(
            event_name = "session.concluded",
            session_id = %self.session.id(),
            correlation_id = %audit.correlation_id,
            has_recommendations = self.session.has_recommendations(),
            "consultation concluded"
        );
        Ok(self.session.view())
    }

    async fn finalize(
        &mut self,
        client: ClientInfo,
        audit: &AuditContext,
    ) -> Result<FinalizedQuote, ApplicationError> {
        if self.session.ledger().is_empty() {
            return Err(DomainError::InvariantViolation(
                "an empty quote cannot be finalized".to_owned(),
            )
            .into());
        }
        let request = FinalizeRequest {
            session_id: self.session.id().clone(),
            quote: self.session.ledger().snapshot(),
            client,
            context: self.session.context().clone(),
            transcript: self.session.turns().to_vec(),
        };

        match self.inventory.finalize_quote(&request).await {
            Ok(finalized) => {
                self.audit_sink.emit(
                    audit
                        .event("quote.finalized", AuditCategory::Persistence, AuditOutcome::Success)
                        .with_metadata("quote_id", finalized.quote_id.clone())
                        .with_metadata("quote_number", finalized.quote_number.clone())
                        .with_metadata("total", request.quote.total.to_string()),
                );
                info!(
                    event_name = "session.quote.finalized",
                    session_id = %self.session.id(),
                    correlation_id = %audit.correlation_id,
                    quote_number = %finalized.quote_number,
                    "quote persisted"
                );
                Ok(finalized)
            }
            Err(error) => {
                self.audit_sink.emit(
                    audit
                        .event("quote.finalize_failed", AuditCategory::Persistence, AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    fn publish_quote(&self, snapshot: &LedgerSnapshot, explanation: Option<&str>, audit: &AuditContext) {
        let payload =
            QuoteUpdatePayload { session_id: self.session.id(), quote: snapshot, explanation };
        match QuoteEvent::quote_update(&payload) {
            Ok(event) => {
                self.registry.publish(self.session.id(), event);
            }
            Err(error) => warn!(
                event_name = "session.publish.encode_failed",
                session_id = %self.session.id(),
                correlation_id = %audit.correlation_id,
                error = %error,
                "quote update could not be encoded"
            ),
        }
    }

    fn publish_turn(
        &self,
        turn: &ConversationTurn,
        degraded_reason: Option<&'static str>,
        audit: &AuditContext,
    ) {
        let payload = AiResponsePayload {
            session_id: self.session.id(),
            turn,
            state: self.session.state().label(),
            degraded_reason,
        };
        match QuoteEvent::ai_response(&payload) {
            Ok(event) => {
                self.registry.publish(self.session.id(), event);
            }
            Err(error) => warn!(
                event_name = "session.publish.encode_failed",
                session_id = %self.session.id(),
                correlation_id = %audit.correlation_id,
                error = %error,
                "ai response could not be encoded"
            ),
        }
    }
}

/// Owns every live session. Each session runs as its own actor, so
/// operations on one session are serialized while sessions proceed
/// independently of each other.
pub struct ConsultationRuntime {
    sessions: RwLock<HashMap<SessionId, mpsc::Sender<SessionCommand>>>,
    oracle: Arc<dyn RecommendationOracle>,
    registry: Arc<dyn SessionRegistry>,
    inventory: Arc<dyn InventoryService>,
    audit_sink: Arc<dyn AuditSink>,
    settings: RuntimeSettings,
}

impl ConsultationRuntime {
    pub fn new(
        oracle: Arc<dyn RecommendationOracle>,
        registry: Arc<dyn SessionRegistry>,
        inventory: Arc<dyn InventoryService>,
        audit_sink: Arc<dyn AuditSink>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            oracle,
            registry,
            inventory,
            audit_sink,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryService> {
        &self.inventory
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Creates a session with a fresh catalog snapshot. A client-supplied id
    /// is kept, typically the one its event stream already subscribed with.
    pub async fn create_session(
        &self,
        session_id: Option<SessionId>,
        context: ConsultationContext,
    ) -> Result<SessionView, ApplicationError> {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        if session_id.as_str().trim().is_empty() {
            return Err(DomainError::InvariantViolation("session id must not be blank".to_owned())
                .into());
        }
        let catalog = self.inventory.list_equipment().await?;
        let catalog_size = catalog.len();

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(DomainError::InvariantViolation(format!(
                "session `{session_id}` already exists"
            ))
            .into());
        }

        let session = Session::new(
            session_id.clone(),
            context,
            catalog,
            LiveQuoteLedger::new(self.pricing()),
        );
        let view = session.view();
        let (sender, receiver) = mpsc::channel(self.settings.queue_depth.max(1));
        let actor = SessionActor {
            session,
            engine: FlowEngine::default(),
            oracle: Arc::clone(&self.oracle),
            registry: Arc::clone(&self.registry),
            inventory: Arc::clone(&self.inventory),
            audit_sink: Arc::clone(&self.audit_sink),
            oracle_timeout: self.settings.oracle_timeout,
        };
        tokio::spawn(actor.run(receiver));
        sessions.insert(session_id.clone(), sender);

        info!(
            event_name = "session.created",
            session_id = %session_id,
            catalog_size,
            "session created"
        );
        Ok(view)
    }

    pub async fn start(&self, session_id: &SessionId) -> Result<TurnOutcome, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::Start { reply }).await
    }

    pub async fn send_message(
        &self,
        session_id: &SessionId,
        content: impl Into<String>,
    ) -> Result<TurnOutcome, ApplicationError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::InvariantViolation("message must not be empty".to_owned())
                .into());
        }
        self.request(session_id, |reply| SessionCommand::Message { content, reply }).await
    }

    pub async fn change_quote(
        &self,
        session_id: &SessionId,
        change: QuoteChange,
    ) -> Result<LedgerSnapshot, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::ChangeQuote { change, reply }).await
    }

    pub async fn adjust_quantity(
        &self,
        session_id: &SessionId,
        equipment_id: EquipmentId,
        installation_zone: Option<String>,
        change: i64,
    ) -> Result<LedgerSnapshot, ApplicationError> {
        let change = QuoteChange::Quantity { equipment_id, installation_zone, change };
        self.change_quote(session_id, change).await
    }

    /// One-shot recommendation against the current catalog. No session is
    /// created and nothing is published; an oracle failure is returned as an
    /// integration error instead of a fallback turn.
    pub async fn recommend_equipment(
        &self,
        context: ConsultationContext,
        turns: Vec<ConversationTurn>,
    ) -> Result<EquipmentRecommendation, ApplicationError> {
        let audit = AuditContext::new(None, Uuid::new_v4().to_string(), "recommendations");
        let catalog = self.inventory.list_equipment().await?;
        let catalog_size = catalog.len();
        let request =
            OracleRequest { context, catalog, turns, ledger: LiveQuoteLedger::new(self.pricing()) };

        let result = match tokio::time::timeout(
            self.settings.oracle_timeout,
            self.oracle.recommend_equipment(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(OracleError::Unavailable(format!(
                "oracle call exceeded {}ms",
                self.settings.oracle_timeout.as_millis()
            ))),
        };
        let reply = match result {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "oracle.recommendations.failed",
                    correlation_id = %audit.correlation_id,
                    reason_code = error.reason_code(),
                    error = %error,
                    "one-shot recommendation failed"
                );
                self.audit_sink.emit(
                    audit
                        .event("oracle.call_failed", AuditCategory::Oracle, AuditOutcome::Failed)
                        .with_metadata("reason_code", error.reason_code()),
                );
                return Err(ApplicationError::Integration(error.to_string()));
            }
        };

        let proposed = match reply.actionable_delta() {
            Some(delta) => request.ledger.apply(delta, Utc::now())?.ledger,
            None => request.ledger,
        };
        info!(
            event_name = "oracle.recommendations.generated",
            correlation_id = %audit.correlation_id,
            catalog_size,
            proposed_items = proposed.items().len(),
            "one-shot recommendation generated"
        );
        Ok(EquipmentRecommendation { reply, proposed_quote: proposed.snapshot() })
    }

    pub async fn conclude(&self, session_id: &SessionId) -> Result<SessionView, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::Conclude { reply }).await
    }

    pub async fn view(&self, session_id: &SessionId) -> Result<SessionView, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::View { reply }).await
    }

    pub async fn transcript(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ConversationTurn>, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::Transcript { reply }).await
    }

    /// Publishes the current ledger to the session's subscriber, if any.
    pub async fn resync(&self, session_id: &SessionId) -> Result<LedgerSnapshot, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::Resync { reply }).await
    }

    pub async fn finalize(
        &self,
        session_id: &SessionId,
        client: ClientInfo,
    ) -> Result<FinalizedQuote, ApplicationError> {
        self.request(session_id, |reply| SessionCommand::Finalize { client, reply }).await
    }

    /// Destroys the session and closes its channel. Commands already queued
    /// still complete; nothing new is accepted.
    pub async fn teardown(&self, session_id: &SessionId) -> Result<(), ApplicationError> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_none() {
            return Err(ApplicationError::SessionNotFound(session_id.to_string()));
        }
        let channel_closed = self.registry.close(session_id);
        info!(
            event_name = "session.teardown",
            session_id = %session_id,
            channel_closed,
            "session destroyed"
        );
        Ok(())
    }

    fn pricing(&self) -> TaxRatePricing {
        TaxRatePricing::new(self.settings.tax_rate).with_currency(self.settings.currency.clone())
    }

    async fn request<T>(
        &self,
        session_id: &SessionId,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, ApplicationError> {
        let sender = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(command(reply))
            .await
            .map_err(|_| ApplicationError::SessionClosed(session_id.to_string()))?;
        response.await.map_err(|_| ApplicationError::SessionClosed(session_id.to_string()))?
    }
}
