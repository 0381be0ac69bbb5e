//! Typed error handling for orderflow
//!
//! Every failure the pipeline or the read path can produce belongs to one of
//! the categories below, so callers can match on the case they care about
//! instead of inspecting strings.
//!
//! # Error Categories
//!
//! - [`OrderError`]: order lookups (not found)
//! - [`ValidationError`]: malformed payloads and rule violations
//! - [`StorageError`]: persistence backend failures
//! - [`RequestError`]: HTTP request problems
//! - [`ConfigError`]: configuration parsing and validation
//!
//! # Example
//!
//! ```rust,ignore
//! match service.get_order("A1").await {
//!     Ok(order) => println!("Found: {:?}", order),
//!     Err(OrderflowError::Order(OrderError::NotFound { order_uid })) => {
//!         println!("Order {} not found", order_uid);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The main error type for orderflow
#[derive(Debug, thiserror::Error)]
pub enum OrderflowError {
    /// Order lookup errors
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Decode and validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage backend errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// HTTP/Request errors
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Error response body for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OrderflowError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderflowError::Order(e) => e.status_code(),
            OrderflowError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderflowError::Storage(e) => e.status_code(),
            OrderflowError::Request(e) => e.status_code(),
            OrderflowError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            OrderflowError::Order(e) => e.error_code(),
            OrderflowError::Validation(e) => e.error_code(),
            OrderflowError::Storage(e) => e.error_code(),
            OrderflowError::Request(e) => e.error_code(),
            OrderflowError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// True when the error means "no such order"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrderflowError::Order(OrderError::NotFound { .. })
                | OrderflowError::Storage(StorageError::NotFound { .. })
        )
    }

    /// Convert to an error response body
    pub fn to_response(&self) -> ErrorResponse {
        // Storage and config failures are reported without backend details
        let message = match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => self.to_string(),
        };
        ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            OrderflowError::Order(OrderError::NotFound { order_uid }) => {
                Some(serde_json::json!({ "order_uid": order_uid }))
            }
            OrderflowError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for OrderflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Order Errors
// =============================================================================

/// Errors related to order lookups
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// No order with this identifier exists
    #[error("order '{order_uid}' not found")]
    NotFound { order_uid: String },
}

impl OrderError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            OrderError::NotFound { .. } => "ORDER_NOT_FOUND",
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to payload decoding and validation
///
/// None of these can be fixed by retrying.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// One or more field-scoped violations, in a stable order
    #[error("{}", format_field_errors(.0))]
    FieldErrors(Vec<FieldValidationError>),

    /// Payload is not a well-formed order document
    #[error("invalid message format: {message}")]
    InvalidJson { message: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValidationError {
    /// Dotted path of the offending field, e.g. `items[0].total_price`
    pub field: String,
    /// Rule that failed, e.g. `length` or `consistency`
    pub code: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

fn format_field_errors(errors: &[FieldValidationError]) -> String {
    let msgs: Vec<String> = errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect();
    format!(
        "validation failed for {} field(s): {}",
        errors.len(),
        msgs.join(", ")
    )
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FieldErrors(_) => "VALIDATION_ERROR",
            ValidationError::InvalidJson { .. } => "INVALID_JSON",
        }
    }

    /// Field errors, empty for non-field variants
    pub fn field_errors(&self) -> &[FieldValidationError] {
        match self {
            ValidationError::FieldErrors(errors) => errors,
            ValidationError::InvalidJson { .. } => &[],
        }
    }

    /// True if any violation is reported for `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.field_errors().iter().any(|e| e.field == field)
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
///
/// Apart from [`StorageError::NotFound`], every variant is treated as
/// transient by the ingestion pipeline and retried.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Requested order does not exist
    #[error("order '{order_uid}' not found in storage")]
    NotFound { order_uid: String },

    /// Connection error
    #[error("Failed to connect to {backend}: {message}")]
    Connection { backend: String, message: String },

    /// Query execution error
    #[error("{backend} query error: {message}")]
    Query { backend: String, message: String },

    /// Transaction could not be started, committed or rolled back
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// Constraint violation other than a duplicate order
    #[error("Data integrity error: {message}")]
    Integrity { message: String },

    /// Backend not available
    #[error("Storage backend '{backend}' is unavailable")]
    Unavailable { backend: String },
}

impl StorageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::NotFound { .. } => "ORDER_NOT_FOUND",
            StorageError::Connection { .. } => "STORAGE_CONNECTION_ERROR",
            StorageError::Query { .. } => "STORAGE_QUERY_ERROR",
            StorageError::Transaction { .. } => "STORAGE_TRANSACTION_ERROR",
            StorageError::Integrity { .. } => "STORAGE_INTEGRITY_ERROR",
            StorageError::Unavailable { .. } => "STORAGE_UNAVAILABLE",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound { .. } | StorageError::Integrity { .. }
        )
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// A required path parameter is empty
    #[error("{parameter} is required")]
    MissingParameter { parameter: String },

    /// A path parameter is outside its allowed bounds
    #[error("{parameter} must be at most {max} characters")]
    ParameterTooLong { parameter: String, max: usize },
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::MissingParameter { .. } => "MISSING_PARAMETER",
            RequestError::ParameterTooLong { .. } => "INVALID_PARAMETER",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config{}: {message}", file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    Parse {
        file: Option<String>,
        message: String,
    },

    /// Missing required field
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// Invalid value
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Environment variable not set
    #[error("Environment variable {name} is not set")]
    MissingEnv { name: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            file: None,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for orderflow operations
pub type OrderflowResult<T> = Result<T, OrderflowError>;
