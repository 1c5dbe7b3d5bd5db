use livequote_core::{
    CatalogSnapshot, ConsultationContext, ConversationTurn, LiveQuoteLedger, SpaceDetails,
};
use tera::{Context, Tera};
use thiserror::Error;

use crate::llm::CompletionRequest;

const SYSTEM_TEMPLATE: &str = "system.txt";
const OPENING_TEMPLATE: &str = "opening.txt";
const FOLLOW_UP_TEMPLATE: &str = "follow_up.txt";
const RECOMMEND_TEMPLATE: &str = "recommend.txt";

#[derive(Debug, Error)]
#[error("prompt template `{template}` failed: {message}")]
pub struct PromptError {
    pub template: &'static str,
    pub message: String,
}

/// Everything the oracle is shown for one turn.
#[derive(Clone, Copy, Debug)]
pub struct PromptInput<'a> {
    pub context: &'a ConsultationContext,
    pub catalog: &'a CatalogSnapshot,
    pub turns: &'a [ConversationTurn],
    pub ledger: &'a LiveQuoteLedger,
}

impl PromptInput<'_> {
    /// The first call of a session has no transcript yet.
    pub fn is_opening(&self) -> bool {
        self.turns.is_empty()
    }
}

pub struct PromptRenderer {
    templates: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut templates = Tera::default();
        for (name, body) in [
            (SYSTEM_TEMPLATE, include_str!("../../../templates/prompts/system.txt")),
            (OPENING_TEMPLATE, include_str!("../../../templates/prompts/opening.txt")),
            (FOLLOW_UP_TEMPLATE, include_str!("../../../templates/prompts/follow_up.txt")),
            (RECOMMEND_TEMPLATE, include_str!("../../../templates/prompts/recommend.txt")),
        ] {
            templates
                .add_raw_template(name, body)
                .map_err(|error| PromptError { template: name, message: error.to_string() })?;
        }
        Ok(Self { templates })
    }

    pub fn render(&self, input: &PromptInput<'_>) -> Result<CompletionRequest, PromptError> {
        let user_template = if input.is_opening() { OPENING_TEMPLATE } else { FOLLOW_UP_TEMPLATE };
        self.render_pair(user_template, input)
    }

    /// One-shot recommendation outside any consultation; earlier turns, if
    /// any, are shown as background only.
    pub fn render_recommendation(
        &self,
        input: &PromptInput<'_>,
    ) -> Result<CompletionRequest, PromptError> {
        self.render_pair(RECOMMEND_TEMPLATE, input)
    }

    fn render_pair(
        &self,
        user_template: &'static str,
        input: &PromptInput<'_>,
    ) -> Result<CompletionRequest, PromptError> {
        let mut context = Context::new();
        context.insert("catalog", &input.catalog.describe());
        context.insert("currency", input.ledger.currency());
        context.insert("usage", input.context.usage_type.label());
        context.insert("space_size", input.context.space_size_label());
        context.insert("budget", &input.context.budget_label());
        context.insert("timeframe", &input.context.timeframe);
        context.insert("requirements", &input.context.specific_requirements);
        context.insert(
            "space_details",
            &input.context.space_details.as_ref().map(describe_space).filter(|text| !text.is_empty()),
        );
        context.insert("quote_summary", &input.ledger.summary());
        context.insert(
            "transcript",
            &input.turns.iter().map(ConversationTurn::transcript_line).collect::<Vec<_>>().join("\n"),
        );

        Ok(CompletionRequest::new(
            self.render_template(SYSTEM_TEMPLATE, &context)?,
            self.render_template(user_template, &context)?,
        ))
    }

    fn render_template(&self, name: &'static str, context: &Context) -> Result<String, PromptError> {
        self.templates
            .render(name, context)
            .map_err(|error| PromptError { template: name, message: error.to_string() })
    }
}

fn describe_space(details: &SpaceDetails) -> String {
    [
        ("Primary use", &details.primary_use),
        ("Ambient noise", &details.ambient_noise),
        ("Existing audio", &details.existing_audio),
        ("Power available", &details.power_available),
        ("Installation complexity", &details.installation_complexity),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.as_deref().map(|value| format!("- {label}: {value}")))
    .collect::<Vec<_>>()
    .join("\n")
}
