//! Mapping from transport outcomes to [`ClassifiedError`]s.
//!
//! [`classify`] is a pure function of its inputs: the same status, body and
//! context always produce the same kind and message.

use crate::error::{ClassifiedError, ErrorKind};
use serde_json::Value;

/// Message for requests that never got a response
pub const NETWORK_MESSAGE: &str = "network error – check connection";
/// Message for 401 responses
pub const AUTH_MESSAGE: &str = "unauthorized – please login again";
/// Message for 403 responses
pub const PERMISSION_MESSAGE: &str = "forbidden – insufficient privileges";
/// Message for 5xx responses
pub const SERVER_MESSAGE: &str = "server error – try again later";
/// Fallback for 406 responses without a body message
pub const UNSUPPORTED_MEDIA_MESSAGE: &str = "unsupported file type – only PDF files are accepted";
/// Fallback for 409 responses without a body message
pub const CONFLICT_MESSAGE: &str = "conflict – record already exists";
/// Fallback for 400 responses when the call site supplies none
pub const VALIDATION_MESSAGE: &str = "invalid request";
/// Fallback for unlisted statuses when the call site supplies none
pub const UNKNOWN_MESSAGE: &str = "request failed";

/// What came back from the transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome<'a> {
    /// Nothing reached the server, or nothing came back
    NoResponse,
    /// The server answered with `status` and an optional JSON body
    Status {
        /// HTTP status code
        status: u16,
        /// Parsed JSON body, when there was one
        body: Option<&'a Value>,
    },
}

/// Call-site specific messages used when the response carries none
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    resource: String,
    validation_fallback: String,
    not_found: Option<String>,
    unknown_fallback: String,
}

impl ErrorContext {
    /// Context for a resource, named the way it reads in "<resource> not found"
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            validation_fallback: VALIDATION_MESSAGE.to_string(),
            not_found: None,
            unknown_fallback: UNKNOWN_MESSAGE.to_string(),
        }
    }

    /// Message for 400 responses without a body message
    #[must_use]
    pub fn with_validation_fallback(mut self, message: impl Into<String>) -> Self {
        self.validation_fallback = message.into();
        self
    }

    /// Override the default "<resource> not found" message
    #[must_use]
    pub fn with_not_found(mut self, message: impl Into<String>) -> Self {
        self.not_found = Some(message.into());
        self
    }

    /// Message for unlisted statuses without a body message
    #[must_use]
    pub fn with_unknown_fallback(mut self, message: impl Into<String>) -> Self {
        self.unknown_fallback = message.into();
        self
    }

    /// Failure used when the request pipeline itself broke
    #[must_use]
    pub fn unknown(&self) -> ClassifiedError {
        ClassifiedError::new(ErrorKind::UnknownError, self.unknown_fallback.clone())
    }

    fn not_found_message(&self) -> String {
        self.not_found
            .clone()
            .unwrap_or_else(|| format!("{} not found", self.resource))
    }
}

/// Classify a transport outcome
///
/// | status        | kind                     | message                                |
/// |---------------|--------------------------|----------------------------------------|
/// | no response   | `NetworkError`           | fixed                                  |
/// | 400           | `ValidationError`        | body, else call-site fallback          |
/// | 401           | `AuthError`              | fixed                                  |
/// | 403           | `PermissionError`        | fixed                                  |
/// | 404           | `NotFoundError`          | body, else override, else "<x> not found" |
/// | 406           | `UnsupportedMediaError`  | body, else fixed fallback              |
/// | 409           | `ConflictError`          | body, else fixed fallback              |
/// | 5xx           | `ServerError`            | fixed                                  |
/// | anything else | `UnknownError`           | body, else call-site fallback          |
#[must_use]
pub fn classify(outcome: Outcome<'_>, context: &ErrorContext) -> ClassifiedError {
    let (status, body) = match outcome {
        Outcome::NoResponse => {
            return ClassifiedError::new(ErrorKind::NetworkError, NETWORK_MESSAGE);
        },
        Outcome::Status { status, body } => (status, body),
    };

    let from_body = body.and_then(body_message);
    let or_else = |fallback: &str| from_body.clone().unwrap_or_else(|| fallback.to_string());

    match status {
        400 => ClassifiedError::new(
            ErrorKind::ValidationError,
            or_else(&context.validation_fallback),
        ),
        401 => ClassifiedError::new(ErrorKind::AuthError, AUTH_MESSAGE),
        403 => ClassifiedError::new(ErrorKind::PermissionError, PERMISSION_MESSAGE),
        404 => ClassifiedError::new(
            ErrorKind::NotFoundError,
            from_body
                .clone()
                .unwrap_or_else(|| context.not_found_message()),
        ),
        406 => ClassifiedError::new(
            ErrorKind::UnsupportedMediaError,
            or_else(UNSUPPORTED_MEDIA_MESSAGE),
        ),
        409 => ClassifiedError::new(ErrorKind::ConflictError, or_else(CONFLICT_MESSAGE)),
        500..=599 => ClassifiedError::new(ErrorKind::ServerError, SERVER_MESSAGE),
        _ => ClassifiedError::new(ErrorKind::UnknownError, or_else(&context.unknown_fallback)),
    }
}

/// Pull a display message out of an error body
///
/// Looks at `message`, then `error` (either a string or an object with its
/// own `message`). A bare JSON string body is used as is.
#[must_use]
pub fn body_message(body: &Value) -> Option<String> {
    let non_blank = |value: &Value| {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    match body {
        Value::Object(map) => map
            .get("message")
            .and_then(non_blank)
            .or_else(|| map.get("error").and_then(non_blank))
            .or_else(|| {
                map.get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(non_blank)
            }),
        Value::String(_) => non_blank(body),
        _ => None,
    }
}
