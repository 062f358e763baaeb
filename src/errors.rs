use thiserror::Error;

/// Why a bind attempt against one backend identity did not produce a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("Service not resolvable: {0}")]
    NotResolvable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bind rejected: {0}")]
    Rejected(String),

    #[error("Null binding")]
    NullBinding,

    #[error("Binding died before the session was established")]
    BindingDied,

    #[error("Service disconnected before the session was established")]
    Disconnected,
}

/// Failure raised by the bound service while a call is in flight.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The remote process is gone; the handle must be dropped.
    #[error("Dead object: {0}")]
    DeadObject(String),

    #[error("Operation not supported by service: {0}")]
    Unsupported(String),

    #[error("Remote error: {0}")]
    Remote(String),
}

impl TransportError {
    /// Whether the failure means the session itself is lost.
    pub fn indicates_session_dead(&self) -> bool {
        matches!(self, TransportError::DeadObject(_))
    }
}

#[derive(Error, Debug)]
pub enum PrinterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Printer service not connected")]
    NotConnected,

    #[error("Reconnect failed after {0} tries")]
    ReconnectFailed(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PrinterError>;
