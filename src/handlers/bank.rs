use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};

use super::header;
use crate::error::AppError;
use crate::middleware::auth::BANK_AUTH_HEADER;
use crate::services::InboundEnvelope;
use crate::AppState;

/// Inward credit notification. Business rejections are answered inside the
/// sealed reply with HTTP 200; only unreadable bodies and internal faults are
/// HTTP errors.
pub async fn inward_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<InboundEnvelope>, JsonRejection>,
) -> Response {
    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(e) => {
            return AppError::BadRequest(format!("Invalid JSON body: {}", e)).into_response();
        }
    };

    match state
        .gateway
        .handle(header(&headers, BANK_AUTH_HEADER), envelope)
        .await
    {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => e.into_response(),
    }
}
