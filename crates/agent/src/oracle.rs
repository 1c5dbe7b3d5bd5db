use std::sync::Arc;

use async_trait::async_trait;
use livequote_core::config::AppConfig;
use livequote_core::{
    CatalogSnapshot, ConsultationContext, ConversationTurn, EquipmentId, LiveQuoteLedger,
    OracleReply,
};
use thiserror::Error;
use tracing::debug;

use crate::guardrails::GuardrailPolicy;
use crate::llm::{CompletionRequest, HttpLlmClient, LlmClient};
use crate::prompt::{PromptError, PromptInput, PromptRenderer};
use crate::response::parse_reply;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle response malformed: {0}")]
    MalformedResponse(String),
    #[error("oracle referenced equipment `{equipment_id}` ({reason_code})")]
    InvalidReference { equipment_id: EquipmentId, reason_code: &'static str },
}

impl OracleError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "oracle_unavailable",
            Self::MalformedResponse(_) => "oracle_malformed_response",
            Self::InvalidReference { .. } => "oracle_invalid_reference",
        }
    }
}

impl From<PromptError> for OracleError {
    fn from(error: PromptError) -> Self {
        Self::Unavailable(error.to_string())
    }
}

/// Everything one oracle call needs, detached from the session that built it.
#[derive(Clone, Debug)]
pub struct OracleRequest {
    pub context: ConsultationContext,
    pub catalog: CatalogSnapshot,
    pub turns: Vec<ConversationTurn>,
    pub ledger: LiveQuoteLedger,
}

#[async_trait]
pub trait RecommendationOracle: Send + Sync {
    /// Next consultation turn: an opening question or a reply to the
    /// latest customer answer.
    async fn recommend(&self, request: &OracleRequest) -> Result<OracleReply, OracleError>;

    /// Stateless one-shot recommendation for the given context. Validated
    /// the same way as a consultation turn.
    async fn recommend_equipment(
        &self,
        request: &OracleRequest,
    ) -> Result<OracleReply, OracleError>;
}

/// Prompt, call, parse, then check every reference against the catalog.
pub struct OracleClient {
    llm: Arc<dyn LlmClient>,
    prompts: PromptRenderer,
    guardrails: GuardrailPolicy,
}

impl OracleClient {
    pub fn new(llm: Arc<dyn LlmClient>, guardrails: GuardrailPolicy) -> Result<Self, PromptError> {
        Ok(Self { llm, prompts: PromptRenderer::new()?, guardrails })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, OracleError> {
        let llm = HttpLlmClient::from_config(&config.llm)
            .map_err(|error| OracleError::Unavailable(error.to_string()))?;
        let guardrails = GuardrailPolicy { llm_can_set_prices: config.quote.llm_can_set_prices };
        Ok(Self::new(Arc::new(llm), guardrails)?)
    }

    async fn complete_validated(
        &self,
        prompt: &CompletionRequest,
        catalog: &CatalogSnapshot,
    ) -> Result<OracleReply, OracleError> {
        let raw = self
            .llm
            .complete(prompt)
            .await
            .map_err(|error| OracleError::Unavailable(error.to_string()))?;

        let parsed = parse_reply(&raw)?;
        let quote_updates = parsed
            .proposed
            .map(|proposed| self.guardrails.resolve(proposed, catalog))
            .transpose()?;

        debug!(
            event_name = "oracle.reply.validated",
            conversation_type = parsed.conversation_type.as_str(),
            should_update_quote = parsed.should_update_quote,
            has_delta = quote_updates.is_some(),
            "oracle reply validated"
        );

        Ok(OracleReply {
            conversation_type: parsed.conversation_type,
            content: parsed.content,
            should_update_quote: parsed.should_update_quote,
            quote_updates,
            details: parsed.details,
        })
    }
}

fn prompt_input(request: &OracleRequest) -> PromptInput<'_> {
    PromptInput {
        context: &request.context,
        catalog: &request.catalog,
        turns: &request.turns,
        ledger: &request.ledger,
    }
}

#[async_trait]
impl RecommendationOracle for OracleClient {
    async fn recommend(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        let prompt = self.prompts.render(&prompt_input(request))?;
        self.complete_validated(&prompt, &request.catalog).await
    }

    async fn recommend_equipment(
        &self,
        request: &OracleRequest,
    ) -> Result<OracleReply, OracleError> {
        let prompt = self.prompts.render_recommendation(&prompt_input(request))?;
        self.complete_validated(&prompt, &request.catalog).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use livequote_core::{
        CatalogSnapshot, ConsultationContext, ConversationType, DeltaAction, Equipment,
        EquipmentId, LiveQuoteLedger,
    };
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{OracleClient, OracleError, OracleRequest, RecommendationOracle};
    use crate::guardrails::GuardrailPolicy;
    use crate::llm::{CompletionRequest, HttpLlmClient, LlmClient, LlmError};

    struct ScriptedLlm {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompts lock").push(request.clone());
            self.reply.clone().map_err(|()| LlmError::Transport("connection refused".to_owned()))
        }
    }

    fn client(reply: Result<&str, ()>) -> OracleClient {
        let llm = ScriptedLlm { reply: reply.map(str::to_owned), prompts: Mutex::new(Vec::new()) };
        OracleClient::new(Arc::new(llm), GuardrailPolicy::default()).expect("templates")
    }

    fn request() -> OracleRequest {
        let equipment = |id: &str| Equipment {
            id: EquipmentId::new(id),
            name: format!("Speaker {id}"),
            category: "Speakers".to_owned(),
            base_price: Decimal::new(899, 0),
            power_rating: None,
            specifications: None,
            available: true,
        };
        OracleRequest {
            context: ConsultationContext::default(),
            catalog: CatalogSnapshot::new(vec![equipment("eq-1"), equipment("eq-2")]),
            turns: Vec::new(),
            ledger: LiveQuoteLedger::default(),
        }
    }

    #[tokio::test]
    async fn valid_recommendation_becomes_catalog_priced_reply() {
        let oracle = client(Ok(
            r#"Here is my answer: {"conversationType":"recommendation","content":"Two speakers","shouldUpdateQuote":true,
               "quoteUpdates":{"action":"add","items":[{"equipmentId":"eq-1","name":"K12","quantity":2,"unitPrice":10,"category":"Speakers"}]}}"#,
        ));
        let reply = oracle.recommend(&request()).await.expect("valid reply");

        assert_eq!(reply.conversation_type, ConversationType::Recommendation);
        let Some(DeltaAction::Add(lines)) = reply.actionable_delta().map(|delta| delta.action.clone())
        else {
            panic!("expected actionable add delta");
        };
        assert_eq!(lines[0].unit_price, Decimal::new(899, 0));
    }

    #[tokio::test]
    async fn fabricated_equipment_is_an_invalid_reference() {
        let oracle = client(Ok(
            r#"{"conversationType":"recommendation","content":"x","shouldUpdateQuote":true,
               "quoteUpdates":{"action":"add","items":[{"equipmentId":"eq-1","quantity":1},{"equipmentId":"eq-99","quantity":1}]}}"#,
        ));
        let error = oracle.recommend(&request()).await.expect_err("eq-99 must be rejected");

        assert_eq!(error.reason_code(), "oracle_invalid_reference");
    }

    #[tokio::test]
    async fn one_shot_recommendation_goes_over_http_and_is_catalog_priced() {
        let server = MockServer::start().await;
        let content = json!({
            "conversationType": "recommendation",
            "content": "Two speakers for the dining room, one for the patio.",
            "shouldUpdateQuote": true,
            "purchaseBenefits": ["Five year warranty"],
            "quoteUpdates": {
                "action": "add",
                "items": [
                    {
                        "equipmentId": "eq-1",
                        "quantity": 2,
                        "unitPrice": 1,
                        "installationZone": "dining"
                    },
                    {"equipmentId": "eq-2", "quantity": 1, "installationZone": "patio"}
                ]
            }
        });
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("do not ask questions"))
            .and(body_string_contains("[id: eq-2]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content.to_string()}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let llm = HttpLlmClient::new(&server.uri(), "gpt-4.1-mini").expect("client");
        let oracle =
            OracleClient::new(Arc::new(llm), GuardrailPolicy::default()).expect("templates");
        let reply = oracle.recommend_equipment(&request()).await.expect("recommendation");

        assert_eq!(reply.conversation_type, ConversationType::Recommendation);
        assert_eq!(reply.details.purchase_benefits, vec!["Five year warranty".to_owned()]);
        let Some(DeltaAction::Add(lines)) = reply.actionable_delta().map(|delta| delta.action.clone())
        else {
            panic!("expected actionable add delta");
        };
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.unit_price == Decimal::new(899, 0)));
        assert_eq!(lines[1].installation_zone.as_deref(), Some("patio"));
    }

    #[tokio::test]
    async fn one_shot_recommendation_rejects_fabricated_equipment() {
        let oracle = client(Ok(
            r#"{"conversationType":"recommendation","content":"x","shouldUpdateQuote":true,
               "quoteUpdates":{"action":"add","items":[{"equipmentId":"eq-404","quantity":1}]}}"#,
        ));
        let error = oracle.recommend_equipment(&request()).await.expect_err("eq-404 is not listed");

        assert_eq!(error.reason_code(), "oracle_invalid_reference");
    }

    #[tokio::test]
    async fn transport_failures_are_unavailable() {
        let error = client(Err(())).recommend(&request()).await.expect_err("transport error");
        assert!(matches!(error, OracleError::Unavailable(_)));
    }

    #[tokio::test]
    async fn prose_without_json_is_malformed() {
        let error = client(Ok("Happy to help with your speakers!"))
            .recommend(&request())
            .await
            .expect_err("no json");
        assert!(matches!(error, OracleError::MalformedResponse(_)));
    }
}
