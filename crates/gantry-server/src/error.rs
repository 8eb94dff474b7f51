use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request lifecycle operation, request is already committed")]
    AlreadyCommitted,
    #[error("response channel already handed off")]
    ChannelGone,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template rendering error: {0}")]
    Template(String),
    #[error("invalid server configuration: {0}")]
    Config(#[from] serde_json::Error),
}
