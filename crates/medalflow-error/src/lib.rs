//! Error taxonomy for the medalflow planning and dispatch core.
//!
//! A single error type, [`FlowError`], carries a categorized [`ErrorCode`],
//! a key/value detail bag, an optional captured cause, and a retryability
//! flag. Callers match on the code rather than on a zoo of error types.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::json;

pub type FlowResult<T> = Result<T, FlowError>;

/// Categorized error codes. Each category owns a numeric range encoded in
/// the string form (`CONFIG_001`, `VALIDATION_004`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration (1xxx)
    ConfigError,
    ConfigMissing,
    ConfigInvalid,
    FeatureDisabled,
    // Validation (2xxx)
    ValidationError,
    InvalidArgument,
    MissingParameter,
    InvalidIdentifier,
    // Connection (3xxx)
    ConnectionError,
    AuthError,
    TimeoutError,
    // Execution (4xxx)
    ExecutionError,
    QueryExecutionError,
    JobSubmissionError,
    JobStatusError,
    TransformationError,
    // Resource (5xxx)
    ResourceNotFound,
    TableNotFound,
    FileNotFound,
    SecretNotFound,
    // Data (6xxx)
    DataQualityError,
    DuplicateKeyError,
    DataIntegrityError,
    // Platform (7xxx)
    PlatformError,
    PlatformNotSupported,
    EngineNotAvailable,
    // Operation (8xxx)
    OperationError,
    LayerProcessingError,
    CopyOperationError,
    TableOperationError,
    CircularDependency,
    DataDeletionError,
    // Retry / transient (9xxx)
    RetryableError,
    RateLimitError,
}

impl ErrorCode {
    /// Stable wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigError => "CONFIG_001",
            ErrorCode::ConfigMissing => "CONFIG_002",
            ErrorCode::ConfigInvalid => "CONFIG_003",
            ErrorCode::FeatureDisabled => "CONFIG_004",
            ErrorCode::ValidationError => "VALIDATION_001",
            ErrorCode::InvalidArgument => "VALIDATION_002",
            ErrorCode::MissingParameter => "VALIDATION_003",
            ErrorCode::InvalidIdentifier => "VALIDATION_004",
            ErrorCode::ConnectionError => "CONNECTION_001",
            ErrorCode::AuthError => "CONNECTION_002",
            ErrorCode::TimeoutError => "CONNECTION_003",
            ErrorCode::ExecutionError => "EXECUTION_001",
            ErrorCode::QueryExecutionError => "EXECUTION_002",
            ErrorCode::JobSubmissionError => "EXECUTION_003",
            ErrorCode::JobStatusError => "EXECUTION_004",
            ErrorCode::TransformationError => "EXECUTION_005",
            ErrorCode::ResourceNotFound => "RESOURCE_001",
            ErrorCode::TableNotFound => "RESOURCE_002",
            ErrorCode::FileNotFound => "RESOURCE_003",
            ErrorCode::SecretNotFound => "RESOURCE_004",
            ErrorCode::DataQualityError => "DATA_001",
            ErrorCode::DuplicateKeyError => "DATA_002",
            ErrorCode::DataIntegrityError => "DATA_003",
            ErrorCode::PlatformError => "PLATFORM_001",
            ErrorCode::PlatformNotSupported => "PLATFORM_002",
            ErrorCode::EngineNotAvailable => "PLATFORM_003",
            ErrorCode::OperationError => "OPERATION_001",
            ErrorCode::LayerProcessingError => "OPERATION_002",
            ErrorCode::CopyOperationError => "OPERATION_003",
            ErrorCode::TableOperationError => "OPERATION_004",
            ErrorCode::CircularDependency => "OPERATION_005",
            ErrorCode::DataDeletionError => "OPERATION_006",
            ErrorCode::RetryableError => "RETRY_001",
            ErrorCode::RateLimitError => "RETRY_002",
        }
    }

    /// Name of the code, e.g. `CIRCULAR_DEPENDENCY`. Used in serialized
    /// error payloads next to the numeric form.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::ConfigMissing => "CONFIG_MISSING",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::FeatureDisabled => "FEATURE_DISABLED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::InvalidIdentifier => "INVALID_IDENTIFIER",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::QueryExecutionError => "QUERY_EXECUTION_ERROR",
            ErrorCode::JobSubmissionError => "JOB_SUBMISSION_ERROR",
            ErrorCode::JobStatusError => "JOB_STATUS_ERROR",
            ErrorCode::TransformationError => "TRANSFORMATION_ERROR",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::SecretNotFound => "SECRET_NOT_FOUND",
            ErrorCode::DataQualityError => "DATA_QUALITY_ERROR",
            ErrorCode::DuplicateKeyError => "DUPLICATE_KEY_ERROR",
            ErrorCode::DataIntegrityError => "DATA_INTEGRITY_ERROR",
            ErrorCode::PlatformError => "PLATFORM_ERROR",
            ErrorCode::PlatformNotSupported => "PLATFORM_NOT_SUPPORTED",
            ErrorCode::EngineNotAvailable => "ENGINE_NOT_AVAILABLE",
            ErrorCode::OperationError => "OPERATION_ERROR",
            ErrorCode::LayerProcessingError => "LAYER_PROCESSING_ERROR",
            ErrorCode::CopyOperationError => "COPY_OPERATION_ERROR",
            ErrorCode::TableOperationError => "TABLE_OPERATION_ERROR",
            ErrorCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            ErrorCode::DataDeletionError => "DATA_DELETION_ERROR",
            ErrorCode::RetryableError => "RETRYABLE_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
        }
    }

    /// Codes that are transient and may succeed on retry.
    pub fn retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorCode::TimeoutError | ErrorCode::RetryableError | ErrorCode::RateLimitError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured cause of a [`FlowError`]: the underlying error's type name and
/// message, detached from the original so errors stay `Clone` + `Send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCause {
    pub type_name: String,
    pub message: String,
}

/// The one error type of the medalflow core.
#[derive(Debug, Clone)]
pub struct FlowError {
    message: String,
    code: ErrorCode,
    details: BTreeMap<String, String>,
    cause: Option<ErrorCause>,
    retryable: bool,
}

impl FlowError {
    /// Create an error with the given code. Retryability defaults from the
    /// code's category.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: BTreeMap::new(),
            cause: None,
            retryable: code.retryable_by_default(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_details<I, K, V>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.details
            .extend(details.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attach the underlying error as a detached cause.
    pub fn caused_by<E: std::error::Error>(mut self, cause: &E) -> Self {
        self.cause = Some(ErrorCause {
            type_name: short_type_name::<E>(),
            message: cause.to_string(),
        });
        self
    }

    /// Attach an already detached cause (used when the original error is
    /// not available as a typed value, e.g. crossed a serialization hop).
    pub fn with_cause(mut self, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        self.cause = Some(ErrorCause {
            type_name: type_name.into(),
            message: message.into(),
        });
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Serialized form for transport and logs.
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "type": "FlowError",
            "message": self.message,
            "error_code": self.code.as_str(),
            "error_name": self.code.name(),
            "details": self.details,
            "is_retryable": self.retryable,
        })
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {}: {})", cause.type_name, cause.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for FlowError {}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

/// Validation failure, with the offending field and value recorded in the
/// detail bag.
pub fn validation_error(
    message: impl Into<String>,
    field: Option<&str>,
    value: Option<&str>,
) -> FlowError {
    let mut err = FlowError::new(ErrorCode::ValidationError, message);
    if let Some(field) = field {
        err = err.with_detail("field", field);
    }
    if let Some(value) = value {
        err = err.with_detail("value", value);
    }
    err
}

pub fn configuration_error(message: impl Into<String>, config_key: Option<&str>) -> FlowError {
    let mut err = FlowError::new(ErrorCode::ConfigError, message);
    if let Some(key) = config_key {
        err = err.with_detail("config_key", key);
    }
    err
}

pub fn connection_error(message: impl Into<String>, service: Option<&str>) -> FlowError {
    let mut err = FlowError::new(ErrorCode::ConnectionError, message);
    if let Some(service) = service {
        err = err.with_detail("service", service);
    }
    err
}

/// Query execution failure. Truncates the statement in the detail bag so
/// log payloads stay bounded.
pub fn query_execution_error<E: std::error::Error>(query: &str, cause: &E) -> FlowError {
    let mut shown = query.trim().to_string();
    if shown.len() > 512 {
        shown.truncate(509);
        shown.push_str("...");
    }
    FlowError::new(ErrorCode::QueryExecutionError, "SQL query execution failed")
        .with_detail("query", shown)
        .caused_by(cause)
}

pub fn circular_dependency(message: impl Into<String>) -> FlowError {
    FlowError::new(ErrorCode::CircularDependency, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("socket closed")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_includes_code_and_cause() {
        let err = FlowError::new(ErrorCode::ConnectionError, "failed to connect to warehouse")
            .caused_by(&Underlying);
        assert_eq!(
            err.to_string(),
            "[CONNECTION_001] failed to connect to warehouse (caused by: Underlying: socket closed)"
        );
    }

    #[test]
    fn retryable_defaults_follow_code() {
        assert!(FlowError::new(ErrorCode::TimeoutError, "t").is_retryable());
        assert!(FlowError::new(ErrorCode::RateLimitError, "r").is_retryable());
        assert!(!FlowError::new(ErrorCode::ValidationError, "v").is_retryable());
        // Explicit override wins over the default.
        assert!(!FlowError::new(ErrorCode::TimeoutError, "t").retryable(false).is_retryable());
    }

    #[test]
    fn details_round_trip_into_value() {
        let err = validation_error("bad identifier", Some("schema_name"), Some("x;DROP"));
        let value = err.to_value();
        assert_eq!(value["error_code"], "VALIDATION_001");
        assert_eq!(value["error_name"], "VALIDATION_ERROR");
        assert_eq!(value["details"]["field"], "schema_name");
        assert_eq!(value["details"]["value"], "x;DROP");
        assert_eq!(value["is_retryable"], false);
    }

    #[test]
    fn query_error_truncates_long_statements() {
        let long = "SELECT ".repeat(200);
        let err = query_execution_error(&long, &Underlying);
        assert_eq!(err.code(), ErrorCode::QueryExecutionError);
        assert_eq!(err.details()["query"].len(), 512);
        assert!(err.details()["query"].ends_with("..."));
    }
}
