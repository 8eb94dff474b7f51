use thiserror::Error;

use gantry_calls::CallError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("invalid cron expression: [{expression}]: {message}")]
    CronExpression { expression: String, message: String },
    #[error("cron worker panicked")]
    CronWorkerPanicked,
    #[error("failed to start background thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("http client error: {0}")]
    HttpClient(String),
    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HostError> for CallError {
    fn from(err: HostError) -> CallError {
        match err {
            HostError::CronExpression { expression, .. } => CallError::InvalidParameter {
                name: "expression",
                value: expression,
            },
            other => CallError::Module(other.to_string()),
        }
    }
}
