use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use livequote_agent::{
    CompletionRequest, ConsultationRuntime, GuardrailPolicy, LlmClient, LlmError, OracleClient,
    RuntimeSettings,
};
use livequote_core::audit::InMemoryAuditSink;
use livequote_core::{ConsultationContext, SessionId};
use livequote_db::{DemoCatalog, InMemoryInventoryService};
use livequote_stream::{ChannelMessage, InMemorySessionRegistry, QuoteEvent};

use crate::routes::{api_router, ApiState};

pub const QUESTION: &str = r#"{"conversationType":"question","content":"What kind of venue is it?","shouldUpdateQuote":false}"#;
pub const RECOMMENDATION: &str = r#"Here is my suggestion:
    {"conversationType":"recommendation","content":"Two K12.2 speakers will cover the dining room.","shouldUpdateQuote":true,
     "quoteUpdates":{"action":"add","items":[{"equipmentId":"eq-qsc-k12-2","name":"QSC K12.2","quantity":2,"unitPrice":899,"totalPrice":1798,"category":"Speakers"}]}}"#;

pub enum Script {
    Reply(&'static str),
    Fail,
}

struct ScriptedLlm {
    script: Mutex<VecDeque<Script>>,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        match self.script.lock().expect("script lock").pop_front() {
            Some(Script::Reply(raw)) => Ok(raw.to_owned()),
            Some(Script::Fail) | None => Err(LlmError::Transport("offline".to_owned())),
        }
    }
}

pub struct Harness {
    pub runtime: Arc<ConsultationRuntime>,
    pub registry: Arc<InMemorySessionRegistry>,
    pub inventory: Arc<InMemoryInventoryService>,
}

impl Harness {
    pub fn state(&self) -> ApiState {
        ApiState { runtime: self.runtime.clone() }
    }

    pub fn router(&self) -> Router {
        api_router(self.state())
    }

    pub async fn create(&self, id: &str) -> SessionId {
        self.runtime
            .create_session(Some(SessionId::new(id)), ConsultationContext::default())
            .await
            .expect("session created");
        SessionId::new(id)
    }
}

pub fn harness(script: Vec<Script>) -> Harness {
    build(script, InMemorySessionRegistry::default())
}

pub fn harness_with_heartbeat(interval: Duration) -> Harness {
    build(vec![], InMemorySessionRegistry::new(interval))
}

fn build(script: Vec<Script>, registry: InMemorySessionRegistry) -> Harness {
    let llm = Arc::new(ScriptedLlm { script: Mutex::new(script.into()) });
    let oracle = OracleClient::new(llm, GuardrailPolicy::default()).expect("templates");
    let registry = Arc::new(registry);
    let inventory = Arc::new(InMemoryInventoryService::new(DemoCatalog::equipment()));
    let runtime = Arc::new(ConsultationRuntime::new(
        Arc::new(oracle),
        registry.clone(),
        inventory.clone(),
        Arc::new(InMemoryAuditSink::default()),
        RuntimeSettings { oracle_timeout: Duration::from_secs(5), ..RuntimeSettings::default() },
    ));
    Harness { runtime, registry, inventory }
}

pub fn expect_event(message: Option<ChannelMessage>) -> QuoteEvent {
    match message {
        Some(ChannelMessage::Event(event)) => event,
        other => panic!("expected an event, got {other:?}"),
    }
}
