use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use livequote_agent::EquipmentRecommendation;
use livequote_core::{ConsultationContext, ConversationTurn};
use serde::Deserialize;

use crate::error::{api_error, json_body, ApiError};
use crate::routes::ApiState;

/// Body of `POST /api/ai/equipment-recommendations`. Earlier turns from a
/// client-side conversation may be passed along as background.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default)]
    pub context: ConsultationContext,
    #[serde(default)]
    pub previous_conversation: Vec<ConversationTurn>,
}

pub async fn recommend(
    State(state): State<ApiState>,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> Result<Json<EquipmentRecommendation>, ApiError> {
    let request = json_body(payload)?;
    state
        .runtime
        .recommend_equipment(request.context, request.previous_conversation)
        .await
        .map(Json)
        .map_err(api_error)
}
