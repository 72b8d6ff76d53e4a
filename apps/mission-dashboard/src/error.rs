use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again later.";

/// One entry of an allauth `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl FieldError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            param: None,
            code: None,
            message: message.into(),
        }
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|err| match err.param.as_deref() {
            Some(param) => format!("{param}: {}", err.message),
            None => err.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("CSRF token missing")]
    MissingCsrfToken,
    #[error("{0}")]
    Rejected(String),
    #[error("{}", join_messages(.0))]
    Validation(Vec<FieldError>),
    #[error("{message}")]
    Transport {
        message: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl AuthError {
    pub(crate) fn transport(message: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { message, source }
    }

    /// Errors in the `{field, message}` shape the signup form renders.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            AuthError::Validation(errors) => errors.clone(),
            other => vec![FieldError::message(other.to_string())],
        }
    }
}

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("mission request failed")]
    Transport(#[source] reqwest::Error),
    #[error("mission endpoint returned {0}")]
    Status(StatusCode),
    #[error("mission payload is not a feature collection")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("map style is not loaded yet")]
    StyleNotLoaded,
    #[error("source `{0}` already exists")]
    DuplicateSource(String),
    #[error("source `{0}` does not exist")]
    MissingSource(String),
    #[error("source `{source_id}` is still used by layer `{layer_id}`")]
    SourceInUse { source_id: String, layer_id: String },
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error("layer `{0}` does not exist")]
    MissingLayer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("geolocation is not supported")]
    Unsupported,
    #[error("position unavailable: {0}")]
    Unavailable(String),
}
