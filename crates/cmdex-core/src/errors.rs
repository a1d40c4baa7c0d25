//! Error facility
//!
//! [`EngineError`] is what commands and interceptors return. [`ExError`] is
//! the canonical form carrying a stable `ERR_*` code for log events.

use cmdex_core_types::RequestId;
use thiserror::Error;

use crate::auth::Permission;
use crate::pwpolicy::PolicyReport;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Stable classification used for log fields, programmatic handling and any
/// outer surface that needs an error code without matching on `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    InvalidInput,
    NotFound,
    /// Optimistic-concurrency failure raised at flush time (retryable)
    Concurrency,
    /// Retries exhausted after repeated concurrency failures
    Conflict,
    PolicyViolation,
    Unauthorised,
    InvalidConfiguration,
    Persistence,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Conflict => "ERR_CONFLICT",
            ExErrorKind::PolicyViolation => "ERR_POLICY_VIOLATION",
            ExErrorKind::Unauthorised => "ERR_UNAUTHORISED",
            ExErrorKind::InvalidConfiguration => "ERR_INVALID_CONFIG",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether the retry interceptor may re-run a command failing with this kind
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExErrorKind::Concurrency)
    }
}

/// Canonical structured error type
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            request_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy of the command execution core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Bad or missing command input; never retried
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Referenced entity is absent; never retried
    #[error("{entity_type} not found: {entity_id}")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },

    /// Raised by the session layer when an entity changed since it was read
    #[error("Concurrent modification of {entity_type} {entity_id}")]
    ConcurrencyConflict {
        entity_type: String,
        entity_id: String,
    },

    /// The retry interceptor gave up
    #[error("Command {command} failed after {attempts} attempts: {cause}")]
    Conflict {
        command: String,
        attempts: u32,
        cause: Box<EngineError>,
    },

    /// Candidate credential failed one or more policy rules
    #[error("Password does not comply with policy: {report}")]
    PolicyViolation { report: PolicyReport },

    /// Rejected by the authorization interceptor before execution
    #[error("User {user_id} is not authorized to {permission}")]
    Unauthorized {
        user_id: String,
        permission: Permission,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Persistence failure in {op}: {message}")]
    Persistence { op: String, message: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn concurrency(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        EngineError::ConcurrencyConflict {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn persistence(op: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Persistence {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        EngineError::Internal {
            reason: reason.into(),
        }
    }

    /// Canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            EngineError::Validation { .. } => ExErrorKind::InvalidInput,
            EngineError::NotFound { .. } => ExErrorKind::NotFound,
            EngineError::ConcurrencyConflict { .. } => ExErrorKind::Concurrency,
            EngineError::Conflict { .. } => ExErrorKind::Conflict,
            EngineError::PolicyViolation { .. } => ExErrorKind::PolicyViolation,
            EngineError::Unauthorized { .. } => ExErrorKind::Unauthorised,
            EngineError::InvalidConfiguration { .. } => ExErrorKind::InvalidConfiguration,
            EngineError::Persistence { .. } => ExErrorKind::Persistence,
            EngineError::Internal { .. } => ExErrorKind::Internal,
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<EngineError> for ExError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let base = ExError::new(err.kind()).with_message(message);
        match err {
            EngineError::NotFound { entity_id, .. }
            | EngineError::ConcurrencyConflict { entity_id, .. } => base.with_entity_id(entity_id),
            EngineError::Persistence { op, .. } => base.with_op(op),
            EngineError::Conflict { command, .. } => base.with_op(command),
            _ => base,
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::InvalidConfiguration {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::InvalidInput, "ERR_INVALID_INPUT"),
            (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
            (ExErrorKind::Concurrency, "ERR_CONCURRENCY"),
            (ExErrorKind::Conflict, "ERR_CONFLICT"),
            (ExErrorKind::PolicyViolation, "ERR_POLICY_VIOLATION"),
            (ExErrorKind::Unauthorised, "ERR_UNAUTHORISED"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_only_concurrency_is_retryable() {
        assert!(EngineError::concurrency("Task", "t1").is_concurrency_conflict());
        assert!(!EngineError::not_found("Task", "t1").is_concurrency_conflict());
        assert!(!EngineError::validation("taskId", "empty").is_concurrency_conflict());
    }

    #[test]
    fn test_not_found_converts_with_entity_id() {
        let ex: ExError = EngineError::not_found("Task", "missing").into();
        assert_eq!(ex.kind(), ExErrorKind::NotFound);
        assert_eq!(ex.entity_id(), Some("missing"));
        assert_eq!(ex.message(), "Task not found: missing");
    }

    #[test]
    fn test_conflict_display_names_cause() {
        let err = EngineError::Conflict {
            command: "SetOwner".to_string(),
            attempts: 4,
            cause: Box::new(EngineError::concurrency("Task", "t1")),
        };
        let text = err.to_string();
        assert!(text.contains("SetOwner"));
        assert!(text.contains("4 attempts"));
        assert!(text.contains("Task t1"));
    }

    #[test]
    fn test_ex_error_display() {
        let ex = ExError::new(ExErrorKind::Persistence)
            .with_op("flush")
            .with_message("disk full");
        assert_eq!(ex.to_string(), "[ERR_PERSISTENCE] in operation 'flush': disk full");
    }
}
