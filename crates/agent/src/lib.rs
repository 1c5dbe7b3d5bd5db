//! Consultation runtime - oracle client and per-session actors
//!
//! This crate turns a customer conversation into live quote changes:
//! - Renders catalog, transcript and quote summary into oracle prompts
//! - Calls the completion service and coerces its free text into a typed reply
//! - Rejects deltas that reference equipment outside the catalog snapshot
//! - Serializes every operation on a session through one actor task
//!
//! # Architecture
//!
//! 1. **Prompting** (`prompt`) - opening and follow-up templates
//! 2. **Transport** (`llm`) - OpenAI-compatible chat completions with retry
//! 3. **Parsing** (`response`) - first balanced JSON span, field-by-field validation
//! 4. **Guardrails** (`guardrails`) - catalog references and authoritative pricing
//! 5. **Runtime** (`runtime`) - session actors, ledger merges, event publishing
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It never decides prices: unit prices,
//! names and categories come from the catalog snapshot unless an operator
//! explicitly allows otherwise.

pub mod guardrails;
pub mod llm;
pub mod oracle;
pub mod prompt;
pub mod response;
pub mod runtime;
pub mod session;

pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{CompletionRequest, HttpLlmClient, LlmClient, LlmError, RetryPolicy};
pub use oracle::{OracleClient, OracleError, OracleRequest, RecommendationOracle};
pub use runtime::{
    ConsultationRuntime, EquipmentRecommendation, QuoteChange, RuntimeSettings, TurnOutcome,
};
pub use session::{Session, SessionView};
