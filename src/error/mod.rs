use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl SimError {
    /// The only error class the step loop propagates to its caller.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, SimError::ProtocolViolation(_))
    }
}
