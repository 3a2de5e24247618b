//! `POST /webhook/send`: validate, check readiness, dispatch to the text or
//! base64-media send path.

use {
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{error, info, warn},
};

use wabridge_whatsapp::get_chat_id;

use crate::state::AppState;

const MISSING_FIELDS: &str = "phoneNumber and message are required";
const NOT_READY: &str = "WhatsApp client is not ready. Please wait for authentication.";

/// Webhook payload, as sent by automation tools such as n8n.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Base64 image; switches to the media path when non-empty.
    #[serde(default)]
    pub image_base64: Option<String>,
    /// Media caption, falls back to `message`.
    #[serde(default)]
    pub caption: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub async fn send_handler(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "rejected webhook body");
            return failure(StatusCode::BAD_REQUEST, &rejection.body_text());
        },
    };

    let (Some(phone_number), Some(message)) = (
        non_empty(request.phone_number.as_deref()),
        non_empty(request.message.as_deref()),
    ) else {
        return failure(StatusCode::BAD_REQUEST, MISSING_FIELDS);
    };

    let session = &state.session;
    if !session.is_client_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": NOT_READY,
                "ready": false,
            })),
        )
            .into_response();
    }

    let chat_id = get_chat_id(phone_number);
    let result = match non_empty(request.image_base64.as_deref()) {
        Some(image) => {
            let caption = non_empty(request.caption.as_deref()).unwrap_or(message);
            session
                .send_media_base64(&chat_id, image, Some(caption), None, None)
                .await
        },
        None => session.send_text_message(&chat_id, message).await,
    };

    match result {
        Ok(sent) => {
            info!(phone_number, "message sent");
            Json(json!({
                "success": true,
                "messageId": sent.id,
                "chatId": chat_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
            .into_response()
        },
        Err(e) => {
            error!(phone_number, error = %e, "error sending message");
            failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        },
    }
}

fn failure(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": error,
        })),
    )
        .into_response()
}
