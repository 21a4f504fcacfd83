//! JSON envelope shared by every gateway route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use wyapi::{ErrorKind, GatewayError};

/// Non-standard "client closed request", used when a request is cancelled.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// `{code, status, success, msg, message, data}` with the HTTP status equal
/// to `code`.
pub fn envelope(status: StatusCode, message: &str, data: Value) -> Response {
    let code = status.as_u16();
    let body = json!({
        "code": code,
        "status": code,
        "success": status.is_success(),
        "msg": message,
        "message": message,
        "data": data,
    });
    (status, Json(body)).into_response()
}

pub fn success<T: Serialize>(message: &str, data: T) -> Response {
    match serde_json::to_value(data) {
        Ok(data) => envelope(StatusCode::OK, message, data),
        Err(e) => ApiError::internal(format!("cannot encode response: {e}")).into_response(),
    }
}

/// Handler error rendered as an envelope with `data: null`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match e.kind() {
            ErrorKind::InvalidInput | ErrorKind::IdentifierNotFound => StatusCode::BAD_REQUEST,
            ErrorKind::AssetUnavailable => StatusCode::NOT_FOUND,
            ErrorKind::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::UpstreamRequestFailed
            | ErrorKind::EncodingError
            | ErrorKind::DownloadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        envelope(self.status, &self.message, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_envelope_has_all_keys() {
        let resp = success("ok", json!({ "id": 1 }));
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["code"], 200);
        assert_eq!(v["status"], 200);
        assert_eq!(v["success"], true);
        assert_eq!(v["msg"], "ok");
        assert_eq!(v["message"], "ok");
        assert_eq!(v["data"]["id"], 1);
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let cases = [
            (GatewayError::InvalidInput("x".into()), 400),
            (GatewayError::IdentifierNotFound("x".into()), 400),
            (GatewayError::AssetUnavailable("x".into()), 404),
            (GatewayError::Cancelled, 499),
            (GatewayError::TimedOut, 500),
            (GatewayError::Malformed("x".into()), 500),
        ];
        for (err, status) in cases {
            let resp = ApiError::from(err).into_response();
            assert_eq!(resp.status().as_u16(), status);
            let v = body_json(resp).await;
            assert_eq!(v["code"], status);
            assert_eq!(v["success"], false);
            assert!(v["data"].is_null());
        }
    }
}
