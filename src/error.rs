use thiserror::Error;

/// Error taxonomy for the debug mediation core.
///
/// Variants map to the semantic error kinds of the orchestrator's error
/// handling design: configuration, adapter/runtime discovery, protocol,
/// connection-lost, timeout, and daemon-input. Every public command on
/// `DebugSession` catches these at its boundary and renders them as
/// `"Error: …"` strings; callers never see this enum directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Adapter discovery error: {0}")]
    AdapterDiscovery(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Daemon input error: {0}")]
    DaemonInput(String),

    #[error("No active debug session")]
    SessionNotFound,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;
