use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::trip::TripState;

/// Main error type for the ridelink core
#[derive(Debug)]
pub enum RideLinkError {
    // HTTP and API errors
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),

    // Trip lifecycle errors
    InvalidTransition { state: TripState, event: String },
    TripNotFound(String),
    DriverNotFound(String),
    RiderNotFound(String),

    // Session/binding errors
    AlreadyBound { trip_id: String, role: String },
    NotBound(String),
    Busy,
    PeerLost(String),

    // Storage errors
    StoreConnection(String),
    StoreQuery(String),
    StoreSerialization(String),

    // Realtime communication errors
    WebSocketConnection(String),
    WebSocketMessage(String),
    ChannelClosed,

    // Network and HTTP client errors (webhook notifier)
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration errors
    ConfigurationError(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for RideLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideLinkError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RideLinkError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RideLinkError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            RideLinkError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            RideLinkError::InvalidTransition { state, event } => {
                write!(f, "Invalid transition: {} not legal from {:?}", event, state)
            }
            RideLinkError::TripNotFound(id) => write!(f, "Trip not found: {}", id),
            RideLinkError::DriverNotFound(id) => write!(f, "Driver not found: {}", id),
            RideLinkError::RiderNotFound(id) => write!(f, "Rider not found: {}", id),

            RideLinkError::AlreadyBound { trip_id, role } => {
                write!(f, "A {} session is already bound to trip {}", role, trip_id)
            }
            RideLinkError::NotBound(msg) => write!(f, "Session not bound: {}", msg),
            RideLinkError::Busy => write!(f, "Peer outbound queue is full, retry after backoff"),
            RideLinkError::PeerLost(trip_id) => {
                write!(f, "Peer connection lost for trip {}", trip_id)
            }

            RideLinkError::StoreConnection(msg) => write!(f, "Store connection error: {}", msg),
            RideLinkError::StoreQuery(msg) => write!(f, "Store query error: {}", msg),
            RideLinkError::StoreSerialization(msg) => {
                write!(f, "Store serialization error: {}", msg)
            }

            RideLinkError::WebSocketConnection(msg) => {
                write!(f, "WebSocket connection error: {}", msg)
            }
            RideLinkError::WebSocketMessage(msg) => write!(f, "WebSocket message error: {}", msg),
            RideLinkError::ChannelClosed => write!(f, "Communication channel closed"),

            RideLinkError::NetworkTimeout => write!(f, "Network request timed out"),
            RideLinkError::NetworkConnection(msg) => {
                write!(f, "Network connection error: {}", msg)
            }
            RideLinkError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),

            RideLinkError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            RideLinkError::JsonSerialization(msg) => {
                write!(f, "JSON serialization error: {}", msg)
            }

            RideLinkError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            RideLinkError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            RideLinkError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RideLinkError {}

impl RideLinkError {
    /// Stable machine-readable code, shared by the HTTP error body and the
    /// WebSocket error frame.
    pub fn code(&self) -> &'static str {
        match self {
            RideLinkError::BadRequest(_) => "bad_request",
            RideLinkError::NotFound(_) => "not_found",
            RideLinkError::Conflict(_) => "conflict",
            RideLinkError::InternalServer(_) => "internal_error",
            RideLinkError::InvalidTransition { .. } => "invalid_transition",
            RideLinkError::TripNotFound(_) => "trip_not_found",
            RideLinkError::DriverNotFound(_) => "driver_not_found",
            RideLinkError::RiderNotFound(_) => "rider_not_found",
            RideLinkError::AlreadyBound { .. } => "already_bound",
            RideLinkError::NotBound(_) => "not_bound",
            RideLinkError::Busy => "busy",
            RideLinkError::PeerLost(_) => "peer_lost",
            RideLinkError::StoreConnection(_) => "store_connection",
            RideLinkError::StoreQuery(_) => "store_query",
            RideLinkError::StoreSerialization(_) => "store_serialization",
            RideLinkError::WebSocketConnection(_) => "websocket_connection",
            RideLinkError::WebSocketMessage(_) => "websocket_message",
            RideLinkError::ChannelClosed => "channel_closed",
            RideLinkError::NetworkTimeout => "network_timeout",
            RideLinkError::NetworkConnection(_) => "network_connection",
            RideLinkError::HttpClient(_) => "http_client",
            RideLinkError::JsonParsing(_) => "json_parsing",
            RideLinkError::JsonSerialization(_) => "json_serialization",
            RideLinkError::ValidationFailed(_) => "validation_failed",
            RideLinkError::InvalidFieldValue { .. } => "invalid_field",
            RideLinkError::ConfigurationError(_) => "configuration_error",
        }
    }
}

impl IntoResponse for RideLinkError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            RideLinkError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            RideLinkError::NotFound(_)
            | RideLinkError::TripNotFound(_)
            | RideLinkError::DriverNotFound(_)
            | RideLinkError::RiderNotFound(_) => (StatusCode::NOT_FOUND, None),
            RideLinkError::Conflict(_) | RideLinkError::AlreadyBound { .. } => {
                (StatusCode::CONFLICT, None)
            }
            RideLinkError::InvalidTransition { .. } => (StatusCode::UNPROCESSABLE_ENTITY, None),
            RideLinkError::NotBound(_) => (StatusCode::BAD_REQUEST, None),
            RideLinkError::Busy => (StatusCode::TOO_MANY_REQUESTS, None),

            RideLinkError::ValidationFailed(errors) => {
                (StatusCode::BAD_REQUEST, serde_json::to_value(errors).ok())
            }
            RideLinkError::InvalidFieldValue { .. } => (StatusCode::BAD_REQUEST, None),

            // Everything else is an internal server error
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let error_response = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type RideLinkResult<T> = Result<T, RideLinkError>;

// Conversion implementations for common error types
impl From<redis::RedisError> for RideLinkError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => RideLinkError::StoreConnection(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => {
                RideLinkError::StoreConnection("Authentication failed".to_string())
            }
            _ => RideLinkError::StoreQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RideLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RideLinkError::NetworkTimeout
        } else if err.is_connect() {
            RideLinkError::NetworkConnection(err.to_string())
        } else {
            RideLinkError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RideLinkError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            RideLinkError::JsonParsing(err.to_string())
        } else {
            RideLinkError::JsonSerialization(err.to_string())
        }
    }
}

// Helper functions for creating common errors
impl RideLinkError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RideLinkError::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RideLinkError::Conflict(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        RideLinkError::NotFound(resource.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        RideLinkError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        RideLinkError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn trip_not_found(trip_id: impl Into<String>) -> Self {
        RideLinkError::TripNotFound(trip_id.into())
    }

    pub fn driver_not_found(driver_id: impl Into<String>) -> Self {
        RideLinkError::DriverNotFound(driver_id.into())
    }

    pub fn invalid_transition(state: TripState, event: impl Into<String>) -> Self {
        RideLinkError::InvalidTransition { state, event: event.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RideLinkError::TripNotFound("trp-250807-a1b2c".to_string());
        assert_eq!(error.to_string(), "Trip not found: trp-250807-a1b2c");
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = RideLinkError::invalid_transition(TripState::Requested, "StartTrip");
        assert!(error.to_string().contains("StartTrip"));
        assert!(error.to_string().contains("Requested"));
        assert_eq!(error.code(), "invalid_transition");
    }

    #[test]
    fn test_validation_error() {
        let error = RideLinkError::validation_error("rating", "must be between 1 and 5");
        match error {
            RideLinkError::ValidationFailed(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "rating");
                assert_eq!(errors[0].message, "must be between 1 and 5");
            }
            _ => panic!("Expected ValidationFailed error"),
        }
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(RideLinkError::bad_request("test"), RideLinkError::BadRequest(_)));
        assert!(matches!(RideLinkError::conflict("test"), RideLinkError::Conflict(_)));
        assert!(matches!(RideLinkError::not_found("test"), RideLinkError::NotFound(_)));
        assert!(matches!(RideLinkError::internal_error("test"), RideLinkError::InternalServer(_)));
    }
}
