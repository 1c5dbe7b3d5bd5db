use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::sse::{Event, Sse},
    Json,
};
use futures::{future, Stream, StreamExt};
use livequote_agent::QuoteChange;
use livequote_core::{EquipmentId, LedgerSnapshot, QuoteDelta, SessionId};
use livequote_stream::{ChannelMessage, EventType, PublishOutcome, QuoteEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{api_error, bad_request, json_body, ApiError};
use crate::routes::ApiState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventRequest {
    pub session_id: String,
    pub event: SubmittedEvent,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubmittedEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventResponse {
    pub success: bool,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<LedgerSnapshot>,
}

/// Manual `{equipmentId, installationZone?, quantityChange}` adjustment,
/// shared with the session quantity route. The zone picks the line when the
/// same equipment is quoted for several zones.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChangeRequest {
    pub equipment_id: EquipmentId,
    #[serde(default)]
    pub installation_zone: Option<String>,
    pub quantity_change: i64,
}

impl From<QuantityChangeRequest> for QuoteChange {
    fn from(request: QuantityChangeRequest) -> Self {
        Self::Quantity {
            equipment_id: request.equipment_id,
            installation_zone: request.installation_zone,
            change: request.quantity_change,
        }
    }
}

/// Opens the push channel for a session. The session itself need not exist
/// yet; clients usually subscribe first and create the session after.
pub async fn subscribe(
    State(state): State<ApiState>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);

    info!(
        event_name = "api.events.subscribed",
        session_id = %session_id,
        "event stream opened"
    );

    let subscription = state.runtime.registry().subscribe(&session_id);
    Sse::new(subscription.filter_map(|message| future::ready(sse_frame(message).map(Ok))))
}

fn sse_frame(message: ChannelMessage) -> Option<Event> {
    match message {
        ChannelMessage::Heartbeat => Some(Event::default().comment("heartbeat")),
        ChannelMessage::Event(event) => match event.to_json() {
            Ok(json) => Some(Event::default().data(json)),
            Err(error) => {
                warn!(
                    event_name = "api.events.encode_failed",
                    event_type = event.event_type.as_str(),
                    error = %error,
                    "dropping event that failed to encode"
                );
                None
            }
        },
    }
}

/// Accepts an externally submitted event. Quote changes go through the
/// session's validated ledger path; conversational and error events are
/// relayed to the subscriber untouched.
pub async fn submit(
    State(state): State<ApiState>,
    payload: Result<Json<SubmitEventRequest>, JsonRejection>,
) -> Result<Json<SubmitEventResponse>, ApiError> {
    let request = json_body(payload)?;
    if request.session_id.trim().is_empty() {
        return Err(bad_request("sessionId is required"));
    }
    let session_id = SessionId::new(request.session_id);
    let registry = state.runtime.registry();

    match request.event.event_type {
        EventType::QuoteUpdate => {
            let change = parse_quote_change(request.event.data)?;
            let quote =
                state.runtime.change_quote(&session_id, change).await.map_err(api_error)?;
            Ok(Json(SubmitEventResponse {
                success: true,
                delivered: registry.is_connected(&session_id),
                quote: Some(quote),
            }))
        }
        EventType::AiResponse | EventType::Error => {
            let event_type = request.event.event_type;
            let outcome =
                registry.publish(&session_id, QuoteEvent::new(event_type, request.event.data));
            info!(
                event_name = "api.events.relayed",
                session_id = %session_id,
                event_type = event_type.as_str(),
                delivered = outcome == PublishOutcome::Delivered,
                "manual event relayed"
            );
            Ok(Json(SubmitEventResponse {
                success: true,
                delivered: outcome == PublishOutcome::Delivered,
                quote: None,
            }))
        }
        EventType::Connection => {
            Err(bad_request("connection events are emitted by the server only"))
        }
    }
}

/// A quote change is either a quantity adjustment or a full delta; a delta
/// is recognised by its `action` field.
pub fn parse_quote_change(data: Value) -> Result<QuoteChange, ApiError> {
    if data.get("action").is_some() {
        serde_json::from_value::<QuoteDelta>(data)
            .map(QuoteChange::Delta)
            .map_err(|error| bad_request(format!("invalid quote delta: {error}")))
    } else {
        serde_json::from_value::<QuantityChangeRequest>(data)
            .map(QuoteChange::from)
            .map_err(|error| bad_request(format!("invalid quantity change: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{header, Request, StatusCode},
        Json,
    };
    use futures::StreamExt;
    use livequote_agent::QuoteChange;
    use livequote_core::{DeltaAction, SessionId};
    use livequote_stream::{EventType, SessionRegistry};
    use serde_json::json;
    use tower::ServiceExt;

    use super::{parse_quote_change, submit, SubmitEventRequest};
    use crate::test_support::{expect_event, harness, harness_with_heartbeat};

    fn request(session_id: &str, event: serde_json::Value) -> SubmitEventRequest {
        serde_json::from_value(json!({"sessionId": session_id, "event": event}))
            .expect("valid submit request")
    }

    #[test]
    fn quote_change_payloads_parse_into_both_forms() {
        let quantity =
            parse_quote_change(json!({"equipmentId": "eq-shure-sm58", "quantityChange": -1}))
                .expect("quantity change");
        assert!(matches!(
            quantity,
            QuoteChange::Quantity { change: -1, installation_zone: None, .. }
        ));

        let zoned = parse_quote_change(json!({
            "equipmentId": "eq-qsc-k12-2",
            "installationZone": "patio",
            "quantityChange": -1
        }))
        .expect("zoned quantity change");
        assert!(matches!(
            zoned,
            QuoteChange::Quantity { installation_zone: Some(ref zone), .. } if zone == "patio"
        ));

        let delta = parse_quote_change(json!({
            "action": "remove",
            "items": ["eq-shure-sm58"],
            "explanation": "customer has microphones"
        }))
        .expect("delta");
        match delta {
            QuoteChange::Delta(delta) => {
                assert!(matches!(delta.action, DeltaAction::Remove(ref ids) if ids.len() == 1));
                assert_eq!(delta.explanation.as_deref(), Some("customer has microphones"));
            }
            other => panic!("expected delta, got {other:?}"),
        }

        let (status, _) = parse_quote_change(json!({"equipmentId": "eq-shure-sm58"}))
            .expect_err("missing quantityChange");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = parse_quote_change(json!({"action": "explode", "items": []}))
            .expect_err("unknown action");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn manual_quote_update_goes_through_the_ledger() {
        let harness = harness(vec![]);
        let id = harness.create("session_manual").await;
        let mut subscription = harness.registry.subscribe(&id);
        let _ack = subscription.recv().await;

        let Json(response) = submit(
            State(harness.state()),
            Ok(Json(request(
                "session_manual",
                json!({"type": "quote_update", "data": {
                    "action": "add",
                    "items": [{"equipmentId": "eq-shure-sm58", "name": "ignored", "category": "x",
                               "quantity": 2, "unitPrice": 1}]
                }}),
            ))),
        )
        .await
        .expect("submit");

        assert!(response.success);
        assert!(response.delivered);
        let quote = response.quote.expect("snapshot");
        assert_eq!(quote.items[0].item.name, "Shure SM58 Dynamic Microphone");
        assert_eq!(quote.subtotal, rust_decimal::Decimal::new(258, 0));

        let event = expect_event(subscription.recv().await);
        assert_eq!(event.event_type, EventType::QuoteUpdate);
        assert_eq!(event.data["sessionId"], "session_manual");
    }

    #[tokio::test]
    async fn invalid_manual_quote_update_is_rejected_without_publishing() {
        let harness = harness(vec![]);
        let id = harness.create("session_bad_delta").await;
        let mut subscription = harness.registry.subscribe(&id);
        let _ack = subscription.recv().await;

        let (status, _) = submit(
            State(harness.state()),
            Ok(Json(request(
                "session_bad_delta",
                json!({"type": "quote_update", "data": {"equipmentId": "eq-missing", "quantityChange": 1}}),
            ))),
        )
        .await
        .expect_err("unknown equipment");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        harness.registry.close(&id);
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn manual_quote_update_for_unknown_session_is_not_found() {
        let harness = harness(vec![]);
        let (status, _) = submit(
            State(harness.state()),
            Ok(Json(request(
                "session_nobody",
                json!({"type": "quote_update", "data": {"equipmentId": "eq-shure-sm58", "quantityChange": 1}}),
            ))),
        )
        .await
        .expect_err("unknown session");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ai_response_and_error_events_are_relayed_verbatim() {
        let harness = harness(vec![]);
        let id = SessionId::new("session_relay");
        let mut subscription = harness.registry.subscribe(&id);
        let _ack = subscription.recv().await;

        let Json(response) = submit(
            State(harness.state()),
            Ok(Json(request(
                "session_relay",
                json!({"type": "ai_response", "data": {"content": "operator note"}}),
            ))),
        )
        .await
        .expect("relay");
        assert!(response.delivered);
        assert!(response.quote.is_none());

        let event = expect_event(subscription.recv().await);
        assert_eq!(event.event_type, EventType::AiResponse);
        assert_eq!(event.data, json!({"content": "operator note"}));

        let Json(undelivered) = submit(
            State(harness.state()),
            Ok(Json(request("session_elsewhere", json!({"type": "error", "data": {"message": "x"}})))),
        )
        .await
        .expect("relay without subscriber");
        assert!(!undelivered.delivered);
    }

    #[tokio::test]
    async fn connection_events_cannot_be_submitted() {
        let harness = harness(vec![]);
        let (status, _) = submit(
            State(harness.state()),
            Ok(Json(request("session_any", json!({"type": "connection", "data": {}})))),
        )
        .await
        .expect_err("connection is server-only");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn subscribe_streams_connection_ack_as_sse() {
        let harness = harness(vec![]);
        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/quote-events?sessionId=session_sse")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("no-cache")
        );
        assert!(harness.registry.is_connected(&SessionId::new("session_sse")));

        harness.registry.close(&SessionId::new("session_sse"));
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.starts_with("data: {"), "unexpected frame: {text}");
        assert!(text.contains(r#""type":"connection""#));
        assert!(text.contains(r#""sessionId":"session_sse""#));
    }

    #[tokio::test]
    async fn heartbeats_are_sse_comment_frames() {
        let harness = harness_with_heartbeat(Duration::from_millis(20));
        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/quote-events?sessionId=session_beat")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let mut frames = response.into_body().into_data_stream();
        let ack = frames.next().await.expect("ack frame").expect("ack bytes");
        assert!(String::from_utf8_lossy(&ack).contains(r#""type":"connection""#));
        let beat = frames.next().await.expect("heartbeat frame").expect("heartbeat bytes");
        let beat = String::from_utf8_lossy(&beat).to_string();
        assert!(beat.starts_with(':') && beat.contains("heartbeat"), "unexpected frame: {beat}");
    }

    #[tokio::test]
    async fn subscribe_without_session_id_generates_one() {
        let harness = harness(vec![]);
        let response = harness
            .router()
            .oneshot(Request::builder().uri("/api/quote-events").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        let mut frames = response.into_body().into_data_stream();
        let ack = frames.next().await.expect("ack frame").expect("ack bytes");
        assert!(String::from_utf8_lossy(&ack).contains(r#""sessionId":"session_"#));
        assert_eq!(harness.registry.connected_sessions(), 1);
    }

    #[tokio::test]
    async fn unknown_event_types_are_bad_requests() {
        let harness = harness(vec![]);
        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/quote-events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"sessionId":"s","event":{"type":"nonsense"}}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
