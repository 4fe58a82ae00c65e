use thiserror::Error;

/// Everything that can go wrong between pressing "Ask" and seeing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Quota(String),
    #[error("{0}")]
    Render(String),
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("the request was cancelled")]
    Cancelled,
}

impl ChatError {
    /// Short label shown in front of the message in the output area.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Auth(_) => "Authentication error",
            ChatError::Transport(_) => "Network error",
            ChatError::Quota(_) => "Quota exceeded",
            ChatError::Render(_) => "Unreadable response",
            ChatError::Api { .. } => "API error",
            ChatError::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { name: &'static str, value: String },
    #[error("{name} must be \"transcript\" or \"single\", got {value:?}")]
    InvalidOutputMode { name: &'static str, value: String },
}
