use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use livequote_agent::{SessionView, TurnOutcome};
use livequote_core::{
    ClientInfo, ConsultationContext, ConversationTurn, Equipment, FinalizedQuote, LedgerSnapshot,
    SessionId,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{api_error, bad_request, json_body, ApiError};
use crate::events::QuantityChangeRequest;
use crate::routes::ApiState;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: ConsultationContext,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeBody {
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

pub async fn equipment(State(state): State<ApiState>) -> Result<Json<Vec<Equipment>>, ApiError> {
    let catalog = state
        .runtime
        .inventory()
        .list_equipment()
        .await
        .map_err(|error| api_error(error.into()))?;
    Ok(Json(catalog.items().to_vec()))
}

pub async fn create(
    State(state): State<ApiState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let request = json_body(payload)?;
    let view = state
        .runtime
        .create_session(request.session_id.map(SessionId::new), request.context)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn start(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TurnOutcome>, ApiError> {
    state.runtime.start(&SessionId::new(id)).await.map(Json).map_err(api_error)
}

pub async fn message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let request = json_body(payload)?;
    state
        .runtime
        .send_message(&SessionId::new(id), request.content)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn quantity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<QuantityChangeRequest>, JsonRejection>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    let request = json_body(payload)?;
    state
        .runtime
        .adjust_quantity(
            &SessionId::new(id),
            request.equipment_id,
            request.installation_zone,
            request.quantity_change,
        )
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn quote(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    let view = state.runtime.view(&SessionId::new(id)).await.map_err(api_error)?;
    Ok(Json(view.quote))
}

pub async fn resync(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.runtime.resync(&SessionId::new(id)).await.map(Json).map_err(api_error)
}

pub async fn turns(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConversationTurn>>, ApiError> {
    state.runtime.transcript(&SessionId::new(id)).await.map(Json).map_err(api_error)
}

pub async fn conclude(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    state.runtime.conclude(&SessionId::new(id)).await.map(Json).map_err(api_error)
}

/// Persists the live quote. Client details come from the body, falling back
/// to the ones captured by the consultation wizard.
pub async fn finalize(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<FinalizeBody>, JsonRejection>,
) -> Result<(StatusCode, Json<FinalizedQuote>), ApiError> {
    let request = json_body(payload)?;
    let session_id = SessionId::new(id);
    let client = match request.client_info {
        Some(client) => client,
        None => wizard_client(&state, &session_id).await?,
    };

    let finalized = state.runtime.finalize(&session_id, client).await.map_err(api_error)?;
    info!(
        event_name = "api.sessions.finalized",
        session_id = %session_id,
        quote_number = %finalized.quote_number,
        "quote finalized"
    );
    Ok((StatusCode::CREATED, Json(finalized)))
}

async fn wizard_client(state: &ApiState, session_id: &SessionId) -> Result<ClientInfo, ApiError> {
    let view = state.runtime.view(session_id).await.map_err(api_error)?;
    view.client_info.ok_or_else(|| bad_request("clientInfo is required to finalize a quote"))
}

pub async fn teardown(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .runtime
        .teardown(&SessionId::new(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(api_error)
}
