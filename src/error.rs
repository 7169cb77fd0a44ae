/*!
 * Error types for devtel
 */

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, DevtelError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum DevtelError {
    /// Log store failure (replay, append, decode)
    Store(devtel_core_store::Error),

    /// Endpoint answered with something other than success
    Delivery { status: u16, message: String },

    /// Endpoint could not be reached
    Http(reqwest::Error),

    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Generic error with message
    Other(String),
}

impl DevtelError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DevtelError::Config(_) => EXIT_FATAL,
            DevtelError::Store(err) if !err.is_write_failure() => EXIT_FATAL,
            // Undelivered records stay in the backlog for the next run
            DevtelError::Delivery { .. } | DevtelError::Http(_) => EXIT_PARTIAL,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if the next flush may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            DevtelError::Http(_) => true,
            DevtelError::Delivery { status, .. } => *status >= 500 || *status == 429,
            DevtelError::Store(err) => err.is_write_failure(),
            DevtelError::Io(_) => true,
            DevtelError::Config(_) => false,
            DevtelError::Other(_) => false,
        }
    }

    /// Hint printed under the error message, if any
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            DevtelError::Config(_) => Some("Check the config file or the DEVTEL_* variables"),
            DevtelError::Delivery { status, .. } if *status == 401 || *status == 403 => {
                Some("Check the API key (api_key or DEVTEL_API_KEY)")
            }
            DevtelError::Delivery { .. } | DevtelError::Http(_) => {
                Some("Records were kept and will be sent by the next flush")
            }
            DevtelError::Store(devtel_core_store::Error::InvalidEntry { .. }) => {
                Some("Fix or remove the named line in the log directory")
            }
            _ => None,
        }
    }

    /// Check if this error came from the telemetry endpoint
    pub fn is_delivery_error(&self) -> bool {
        matches!(self, DevtelError::Delivery { .. } | DevtelError::Http(_))
    }
}

impl fmt::Display for DevtelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevtelError::Store(err) => {
                write!(f, "Log store error: {}", err)
            }
            DevtelError::Delivery { status, message } => {
                write!(f, "Delivery rejected with status {}: {}", status, message)
            }
            DevtelError::Http(err) => {
                write!(f, "HTTP error: {}", err)
            }
            DevtelError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            DevtelError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            DevtelError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for DevtelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DevtelError::Store(err) => Some(err),
            DevtelError::Http(err) => Some(err),
            DevtelError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<devtel_core_store::Error> for DevtelError {
    fn from(err: devtel_core_store::Error) -> Self {
        DevtelError::Store(err)
    }
}

impl From<reqwest::Error> for DevtelError {
    fn from(err: reqwest::Error) -> Self {
        DevtelError::Http(err)
    }
}

impl From<io::Error> for DevtelError {
    fn from(err: io::Error) -> Self {
        DevtelError::Io(err)
    }
}

impl From<serde_json::Error> for DevtelError {
    fn from(err: serde_json::Error) -> Self {
        DevtelError::Other(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for DevtelError {
    fn from(err: anyhow::Error) -> Self {
        DevtelError::Config(format!("{:#}", err))
    }
}
