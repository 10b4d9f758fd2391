//! # Error Handling
//!
//! Shared error taxonomy for the Swift-Signals services using `thiserror`.
//!
//! Every layer constructs [`ServiceError`] values through the factory helpers
//! so the `context` map is filled uniformly. The gRPC boundary converts a
//! `ServiceError` to a `tonic::Status` exactly once, in [`ServiceError::into_status`];
//! the mapping is bijective on [`ErrorKind`]. Internal causes (database driver
//! errors, hashing failures) are logged server-side and never leak to callers.

use std::collections::BTreeMap;

use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// Custom result type for Swift-Signals operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Message returned for any error the caller must not learn details about.
const INTERNAL_MESSAGE: &str = "internal server error";

/// Metadata key carrying the field-keyed validation messages, JSON encoded.
pub const VALIDATION_ERRORS_KEY: &str = "x-validation-errors";

/// Error classification shared by both services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    Unauthorized,
    Forbidden,
    Database,
    Internal,
    External,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Database => "DB_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::External => "EXTERNAL_ERROR",
        };
        write!(f, "{name}")
    }
}

/// Main error type for the Swift-Signals services.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Input failed validation. `fields` maps field names to human messages
    /// suitable for form rendering.
    #[error("validation error: {message}")]
    Validation { message: String, fields: BTreeMap<String, String> },

    /// A referenced entity does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String, id: String },

    /// A unique constraint would be violated.
    #[error("{message}")]
    AlreadyExists { message: String },

    /// Credentials absent or invalid.
    #[error("{message}")]
    Unauthorized { message: String },

    /// Caller is authenticated but not allowed to perform the operation.
    #[error("{message}")]
    Forbidden { message: String },

    /// Database and storage errors.
    #[error("database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Internal server errors.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failures in external collaborators (mail transport, engines).
    #[error("external error: {message}")]
    External {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServiceError {
    /// Create a validation error without field detail.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), fields: BTreeMap::new() }
    }

    /// Create a validation error carrying field-keyed messages.
    pub fn validation_fields<S: Into<String>>(
        message: S,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self::Validation { message: message.into(), fields }
    }

    /// Create a not found error.
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound { resource: resource.into(), id: id.into() }
    }

    /// Create an already exists error.
    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::AlreadyExists { message: message.into() }
    }

    /// Create an unauthorized error.
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Create a forbidden error.
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden { message: message.into() }
    }

    /// Create a database error with context.
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create an internal error with a cause.
    pub fn internal_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(source) }
    }

    /// Create an external collaborator error.
    pub fn external<S: Into<String>>(message: S) -> Self {
        Self::External { message: message.into(), source: None }
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation { .. } => ErrorKind::Validation,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ServiceError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ServiceError::Forbidden { .. } => ErrorKind::Forbidden,
            ServiceError::Database { .. } => ErrorKind::Database,
            ServiceError::Internal { .. } => ErrorKind::Internal,
            ServiceError::External { .. } => ErrorKind::External,
        }
    }

    /// Convert into the canonical wire status.
    ///
    /// The mapping is the single exhaustive match over the taxonomy. Internal
    /// kinds collapse to `Internal` with an opaque message; everything else
    /// surfaces its user-safe message as-is. Validation errors additionally
    /// attach their field map as JSON in response metadata.
    pub fn into_status(self) -> Status {
        match self {
            ServiceError::Validation { ref message, ref fields } => {
                let mut status = Status::new(Code::InvalidArgument, message.clone());
                if !fields.is_empty() {
                    if let Ok(json) = serde_json::to_string(fields) {
                        if let Ok(value) = MetadataValue::try_from(json.as_str()) {
                            status.metadata_mut().insert(VALIDATION_ERRORS_KEY, value);
                        }
                    }
                }
                status
            }
            ServiceError::NotFound { .. } => Status::new(Code::NotFound, self.to_string()),
            ServiceError::AlreadyExists { message } => Status::new(Code::AlreadyExists, message),
            ServiceError::Unauthorized { message } => Status::new(Code::Unauthenticated, message),
            ServiceError::Forbidden { message } => Status::new(Code::PermissionDenied, message),
            ServiceError::Database { .. }
            | ServiceError::Internal { .. }
            | ServiceError::External { .. } => {
                tracing::error!(error = %self, kind = %self.kind(), "internal failure surfaced to RPC boundary");
                Status::new(Code::Internal, INTERNAL_MESSAGE)
            }
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        err.into_status()
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "database operation failed".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_invalid_argument() {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), "Invalid email format".to_string());
        let status = ServiceError::validation_fields("invalid input", fields).into_status();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "invalid input");
        let meta = status.metadata().get(VALIDATION_ERRORS_KEY).expect("validation metadata");
        assert!(meta.to_str().unwrap().contains("Invalid email format"));
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let status = ServiceError::not_found("user", "abc").into_status();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "user not found");
    }

    #[test]
    fn already_exists_maps_to_already_exists() {
        let status =
            ServiceError::already_exists("user with this email already exists").into_status();
        assert_eq!(status.code(), Code::AlreadyExists);
    }

    #[test]
    fn unauthorized_maps_to_unauthenticated() {
        let status = ServiceError::unauthorized("invalid credentials").into_status();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "invalid credentials");
    }

    #[test]
    fn forbidden_maps_to_permission_denied() {
        let status =
            ServiceError::forbidden("only admins can access this endpoint").into_status();
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(status.message(), "only admins can access this endpoint");
    }

    #[test]
    fn internal_kinds_do_not_leak_detail() {
        let db = ServiceError::database(sqlx::Error::RowNotFound, "select failed").into_status();
        assert_eq!(db.code(), Code::Internal);
        assert_eq!(db.message(), "internal server error");

        let internal = ServiceError::internal("token signing key unset").into_status();
        assert_eq!(internal.code(), Code::Internal);
        assert_eq!(internal.message(), "internal server error");

        let external = ServiceError::external("mail transport unavailable").into_status();
        assert_eq!(external.code(), Code::Internal);
        assert_eq!(external.message(), "internal server error");
    }

    #[test]
    fn kind_display_names() {
        assert_eq!(ErrorKind::Validation.to_string(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::Database.to_string(), "DB_ERROR");
        assert_eq!(ErrorKind::External.to_string(), "EXTERNAL_ERROR");
    }
}
