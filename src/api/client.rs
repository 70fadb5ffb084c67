use crate::core::value::Value;
use thiserror::Error;

/// Rejection reported by the resource API. The message is kept verbatim so
/// the UI can show exactly what the orchestration endpoint said.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("request failed: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } => message.as_str(),
            Self::Transport(message) => message.as_str(),
        }
    }
}

/// Shape of a query hook result: `{ data, isLoading, isError, error }`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<ApiError>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_error: false,
            error: None,
        }
    }
}

impl<T> QueryState<T> {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn ready(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(error: ApiError) -> Self {
        Self {
            is_error: true,
            error: Some(error),
            ..Self::default()
        }
    }

    /// `None` while the request is still in flight.
    pub fn into_result(self) -> Option<Result<T, ApiError>> {
        if self.is_loading {
            return None;
        }
        match (self.data, self.error) {
            (_, Some(error)) => Some(Err(error)),
            (Some(data), None) => Some(Ok(data)),
            (None, None) => Some(Err(ApiError::Transport("empty response".to_string()))),
        }
    }
}

impl<T> From<Result<T, ApiError>> for QueryState<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => Self::ready(data),
            Err(error) => Self::failed(error),
        }
    }
}

/// Mutation side of the resource API: receives the submit payload.
pub trait ResourceClient {
    fn submit(&mut self, payload: &Value) -> Result<Value, ApiError>;
}

impl<F> ResourceClient for F
where
    F: FnMut(&Value) -> Result<Value, ApiError>,
{
    fn submit(&mut self, payload: &Value) -> Result<Value, ApiError> {
        self(payload)
    }
}
