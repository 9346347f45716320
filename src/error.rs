use thiserror::Error;

/// Main error type for the warden supervisor
#[derive(Debug, Error)]
pub enum WardenError {
    // Watcher lifecycle errors
    #[error("Watcher not found: {0}")]
    WatcherNotFound(String),

    #[error("Failed to spawn watcher '{0}': {1}")]
    Spawn(String, String),

    #[error("Watcher already exists: {0}")]
    WatcherAlreadyExists(String),

    #[error("Failed to stop watcher '{0}': {1}")]
    Stop(String, String),

    #[error("Signal error: {0}")]
    Signal(String),

    // Log sink errors
    #[error("Failed to open log sink for watcher '{0}': {1}")]
    LogSink(String, String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Invalid duration '{0}': {1}")]
    InvalidDuration(String, String),

    // Supervisor errors
    #[error("Supervisor is not running")]
    SupervisorClosed,

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for warden operations
pub type Result<T> = std::result::Result<T, WardenError>;
