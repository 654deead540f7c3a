//! Error types and handling for the virtual interface manager

use thiserror::Error;

/// Main error type for interface management operations
#[derive(Error, Debug)]
pub enum IfaceError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device node missing or inaccessible
    #[error("Device node unavailable: {0}")]
    DeviceNodeUnavailable(String),

    /// Control request rejected due to permissions
    #[error("Insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    /// Requested name already bound to a live interface
    #[error("Name collision: interface {0:?} already exists")]
    NameCollision(String),

    /// Kernel assigned a name incompatible with an explicit request
    #[error("Unexpected rename: requested {requested:?}, kernel assigned {assigned:?}")]
    UnexpectedRename {
        /// Name the caller asked for
        requested: String,
        /// Name the kernel actually assigned
        assigned: String,
    },

    /// Interface name rejected by validation
    #[error("Invalid interface name: {0}")]
    InvalidName(String),

    /// No interface registered under the given name
    #[error("Interface not found: {0:?}")]
    NotFound(String),

    /// Interface is already administratively up
    #[error("Interface already up: {0:?}")]
    AlreadyUp(String),

    /// Interface is already administratively down
    #[error("Interface already down: {0:?}")]
    AlreadyDown(String),

    /// Administrative state change failed at the system level
    #[error("System configuration error: {0}")]
    SystemConfig(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for interface management operations
pub type Result<T> = std::result::Result<T, IfaceError>;

impl From<toml::de::Error> for IfaceError {
    fn from(err: toml::de::Error) -> Self {
        IfaceError::Config(format!("TOML parsing error: {err}"))
    }
}
