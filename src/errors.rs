use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the keke-rider core
#[derive(Debug)]
pub enum KekeError {
    // HTTP and API errors
    BadRequest(String),
    ApiStatus { status: u16, message: String },
    SessionExpired,

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Ride lifecycle errors
    InvalidTransition { from: String, trigger: String },
    CancelBlocked,
    NoActiveRide,
    RideNotFound(String),

    // Location errors
    LocationUnavailable(String),
    GeocodingFailed(String),

    // Realtime channel errors
    ChannelDisconnected,
    ChannelSendFailed(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),

    // Configuration errors
    ConfigurationError(String),

    // Anything else
    Unknown(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Coarse classification used by the UI layer to pick error treatment
/// (blocking notice vs silent degradation vs session wipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Api,
    Network,
    Validation,
    Auth,
    Location,
    Ui,
    Unknown,
}

impl fmt::Display for KekeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KekeError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            KekeError::ApiStatus { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
            KekeError::SessionExpired => write!(f, "Session expired, sign in again"),

            KekeError::NetworkTimeout => write!(f, "Network request timed out"),
            KekeError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            KekeError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            KekeError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            KekeError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            KekeError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            KekeError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            KekeError::InvalidTransition { from, trigger } => {
                write!(f, "Cannot apply '{}' while in stage '{}'", trigger, from)
            }
            KekeError::CancelBlocked => {
                write!(f, "A ride in progress cannot be cancelled")
            }
            KekeError::NoActiveRide => write!(f, "No active ride"),
            KekeError::RideNotFound(id) => write!(f, "Ride not found: {}", id),

            KekeError::LocationUnavailable(msg) => write!(f, "Location unavailable: {}", msg),
            KekeError::GeocodingFailed(msg) => write!(f, "Geocoding failed: {}", msg),

            KekeError::ChannelDisconnected => write!(f, "Realtime channel is disconnected"),
            KekeError::ChannelSendFailed(msg) => write!(f, "Channel send failed: {}", msg),

            KekeError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            KekeError::MissingRequiredField(field) => {
                write!(f, "Missing required field: {}", field)
            }

            KekeError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),

            KekeError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for KekeError {}

// Convenience type alias for Results
pub type KekeResult<T> = Result<T, KekeError>;

impl KekeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KekeError::BadRequest(_) | KekeError::ApiStatus { .. } | KekeError::RideNotFound(_) => {
                ErrorKind::Api
            }
            KekeError::SessionExpired => ErrorKind::Auth,
            KekeError::NetworkTimeout
            | KekeError::NetworkConnection(_)
            | KekeError::HttpClient(_)
            | KekeError::InvalidUrl(_)
            | KekeError::ChannelDisconnected
            | KekeError::ChannelSendFailed(_) => ErrorKind::Network,
            KekeError::JsonParsing(_)
            | KekeError::JsonSerialization(_)
            | KekeError::InvalidFormat(_)
            | KekeError::ValidationFailed(_)
            | KekeError::MissingRequiredField(_)
            | KekeError::InvalidTransition { .. }
            | KekeError::CancelBlocked
            | KekeError::NoActiveRide => ErrorKind::Validation,
            KekeError::LocationUnavailable(_) | KekeError::GeocodingFailed(_) => {
                ErrorKind::Location
            }
            KekeError::ConfigurationError(_) | KekeError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Errors worth a retry affordance rather than a dead end.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::Api | ErrorKind::Location
        )
    }
}

// Conversion implementations for common error types
impl From<reqwest::Error> for KekeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KekeError::NetworkTimeout
        } else if err.is_connect() {
            KekeError::NetworkConnection(err.to_string())
        } else {
            KekeError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KekeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            KekeError::JsonParsing(err.to_string())
        } else {
            KekeError::JsonSerialization(err.to_string())
        }
    }
}

impl From<std::num::ParseFloatError> for KekeError {
    fn from(err: std::num::ParseFloatError) -> Self {
        KekeError::InvalidFormat(format!("Invalid coordinate: {}", err))
    }
}

// Helper functions for creating common errors
impl KekeError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        KekeError::BadRequest(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        KekeError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        KekeError::Unknown(msg.into())
    }
}
