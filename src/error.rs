use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A task needed the language server connection before it existed.
    #[error("No active language server connection")]
    NotConnected,

    #[error("Failed to start language server: {0}")]
    ProcessSpawn(String),

    /// The server answered, but with nothing usable.
    #[error("No {0} available")]
    NoInformation(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown envelope type: {0}")]
    UnknownEnvelope(String),

    #[error("Malformed envelope: {0}")]
    Decode(String),

    #[error("Language server already started")]
    AlreadyStarted,

    #[error("Task ended without a result")]
    TaskAborted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn no_information(what: impl Into<String>) -> Self {
        BridgeError::NoInformation(what.into())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::NotConnected.to_string(),
            "No active language server connection"
        );
        assert_eq!(
            BridgeError::no_information("quickinfo").to_string(),
            "No quickinfo available"
        );

        let err = BridgeError::Rpc {
            code: -32601,
            message: "Method not found".into(),
        };
        assert!(err.to_string().contains("-32601"));
        assert!(err.to_string().contains("Method not found"));
    }
}
