//! Error types for resource controllers.

use resource_sync_runtime::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed request, derived from the transport outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No response was received
    NetworkError,
    /// 400
    ValidationError,
    /// 401
    AuthError,
    /// 403
    PermissionError,
    /// 404
    NotFoundError,
    /// 406
    UnsupportedMediaError,
    /// 409
    ConflictError,
    /// Any 5xx
    ServerError,
    /// Everything else, including failures inside the request pipeline
    UnknownError,
}

impl ErrorKind {
    /// Stable name used in logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "NetworkError",
            Self::ValidationError => "ValidationError",
            Self::AuthError => "AuthError",
            Self::PermissionError => "PermissionError",
            Self::NotFoundError => "NotFoundError",
            Self::UnsupportedMediaError => "UnsupportedMediaError",
            Self::ConflictError => "ConflictError",
            Self::ServerError => "ServerError",
            Self::UnknownError => "UnknownError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request failure reduced to a kind and a message fit for display
///
/// The `Display` output is the message alone, so it can go straight into a
/// banner or notice.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ClassifiedError {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl ClassifiedError {
    /// Create a classified error
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by [`ResourceController`](crate::controller::ResourceController) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The request reached a definite failure
    #[error(transparent)]
    Request(#[from] ClassifiedError),

    /// A newer fetch was issued before this one settled; its result was not applied
    #[error("superseded by a newer fetch")]
    Superseded,

    /// The controller's store rejected the operation or timed out
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ResourceError {
    /// The classified failure, if the request itself failed
    #[must_use]
    pub const fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Request(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the failure only means a newer request took over
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}
