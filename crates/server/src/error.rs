use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use livequote_core::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

/// JSON body of every non-2xx API response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(source: ApplicationError) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = source.into_interface(correlation_id.clone());

    let (status, message) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, interface.user_message().to_owned())
        }
        InterfaceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, interface.user_message().to_owned())
        }
    };

    if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface.message(),
            "request failed"
        );
    } else {
        warn!(
            event_name = "api.request.rejected",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface.message(),
            "request rejected"
        );
    }

    (status, Json(ErrorBody { error: message, correlation_id }))
}

/// Rejection for malformed request bodies that never reach the runtime.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    let message = message.into();
    warn!(
        event_name = "api.request.rejected",
        correlation_id = %correlation_id,
        status = 400,
        error = %message,
        "request rejected"
    );
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message, correlation_id }))
}

/// Unwraps a JSON body, answering 400 with the extractor's reason on failure.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| bad_request(rejection.body_text()))
}
