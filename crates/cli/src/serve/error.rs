//! The response envelope and the mapping from marketplace errors to HTTP.

use std::str::FromStr;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use suitedbot_market::MarketError;
use tracing::error;

#[derive(Debug)]
pub(crate) enum ApiError {
    /// No credential, or one the identity provider does not recognise.
    Unauthenticated(String),
    Market(MarketError),
    Internal(String),
}

pub(crate) type ApiResult = Result<Response, ApiError>;

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        ApiError::Market(e)
    }
}

impl ApiError {
    pub(crate) fn unauthenticated(msg: impl Into<String>) -> Self {
        ApiError::Unauthenticated(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Market(e) => match e {
                MarketError::Validation(_)
                | MarketError::InvalidState(_)
                | MarketError::DuplicateReview(_)
                | MarketError::InsufficientFunds(_) => StatusCode::BAD_REQUEST,
                MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
                MarketError::NotFound(_) => StatusCode::NOT_FOUND,
                MarketError::Conflict(_) => StatusCode::CONFLICT,
                MarketError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Unauthenticated(msg) => msg,
            ApiError::Market(MarketError::Store(e)) => {
                error!(error = %e, "store failure");
                "Internal server error".to_string()
            }
            ApiError::Market(e) => e.to_string(),
            ApiError::Internal(msg) => {
                error!(error = %msg, "internal failure");
                "Internal server error".to_string()
            }
        };
        json_error(status, &message)
    }
}

pub(crate) fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

/// 200 with `payload`'s fields alongside `success: true`.
pub(crate) fn json_ok(payload: impl Serialize) -> ApiResult {
    let body = match serde_json::to_value(payload).map_err(|e| ApiError::Internal(e.to_string()))? {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({"success": true, "data": other}),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// Decode a JSON request body. An empty body decodes as `T::default()`.
pub(crate) fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| MarketError::validation(format!("Invalid request body: {e}")).into())
}

/// Parse a path identifier. Anything unparseable cannot name a record.
pub(crate) fn parse_id<T: FromStr>(raw: &str, entity: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| MarketError::not_found(format!("{entity} not found")).into())
}
