use thiserror::Error;

/// Failure taxonomy for the call boundary.
///
/// Boundary-facing functions never panic across the call edge; every failure
/// is reported as one of these values. Internal components keep their own
/// error types and convert at the module layer.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid empty call name specified")]
    EmptyName,
    #[error("duplicate call name specified: [{0}]")]
    DuplicateName(String),
    #[error("unknown call name specified: [{0}]")]
    UnknownName(String),
    #[error("invalid input payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("required parameter '{0}' not supplied")]
    MissingParameter(&'static str),
    #[error("invalid '{name}' parameter specified: [{value}]")]
    InvalidParameter { name: &'static str, value: String },
    #[error("invalid '{0}' handle specified")]
    HandleNotFound(&'static str),
    #[error("script engine failure: {0}")]
    Engine(String),
    #[error("native module failure: {0}")]
    Module(String),
    #[error("call error for name: [{name}]: {message}")]
    Dispatch { name: String, message: String },
}

impl CallError {
    pub fn invalid_parameter(name: &'static str, value: impl ToString) -> Self {
        CallError::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}
