use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot reach server: {0}")]
    Network(String),
    #[error("session expired, please log in again")]
    Unauthorized,
    #[error("{message}")]
    Server {
        status: StatusCode,
        body: Option<Value>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("message is empty")]
    EmptyMessage,
    #[error("not logged in")]
    MissingToken,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Builds a `Server` error, keeping the structured body when the server sent one.
    pub fn from_response(status: StatusCode, raw: &str) -> Self {
        let body = serde_json::from_str::<Value>(raw).ok();
        let message = body
            .as_ref()
            .and_then(|b| {
                b.get("error")
                    .or_else(|| b.get("message"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        ApiError::Server {
            status,
            body,
            message,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
