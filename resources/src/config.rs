//! Configuration of resources and of the console process.
//!
//! A [`ResourceConfig`] is everything that distinguishes one admin list
//! from another: endpoint paths, paging parameters and messages. The
//! controller logic is the same for all of them.
//!
//! [`ConsoleConfig`] is loaded from environment variables with defaults
//! for everything.

use crate::classify::ErrorContext;
use crate::id::RecordId;
use crate::transport::{Method, TransportRequest};
use crate::types::{ListQuery, Operation, Patch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

/// Default page size
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// Default lifetime of a notice
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_millis(3000);
/// Default time a controller waits for a request to settle
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a list endpoint expects the page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `?limit=20&offset=40`
    Offset {
        /// Name of the page size parameter
        limit_param: &'static str,
        /// Name of the offset parameter
        offset_param: &'static str,
    },
    /// `?page=3&limit=20`, pages counted from 1
    Page {
        /// Name of the page number parameter
        page_param: &'static str,
        /// Name of the page size parameter
        size_param: &'static str,
    },
}

impl PagingStyle {
    /// `limit` and `offset`
    #[must_use]
    pub const fn offset() -> Self {
        Self::Offset {
            limit_param: "limit",
            offset_param: "offset",
        }
    }

    /// `page` and `limit`
    #[must_use]
    pub const fn page() -> Self {
        Self::Page {
            page_param: "page",
            size_param: "limit",
        }
    }

    /// Query parameters for a window
    #[must_use]
    pub fn query_pairs(&self, limit: u64, offset: u64) -> [(String, String); 2] {
        let limit = limit.max(1);
        match *self {
            Self::Offset {
                limit_param,
                offset_param,
            } => [
                (limit_param.to_string(), limit.to_string()),
                (offset_param.to_string(), offset.to_string()),
            ],
            Self::Page {
                page_param,
                size_param,
            } => [
                (page_param.to_string(), (offset / limit + 1).to_string()),
                (size_param.to_string(), limit.to_string()),
            ],
        }
    }
}

impl Default for PagingStyle {
    fn default() -> Self {
        Self::offset()
    }
}

/// Per-resource overrides of user-facing messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMessages {
    /// Success notice after a mutation
    pub updated: Option<String>,
    /// Success notice after a removal
    pub removed: Option<String>,
    /// Message for 400 responses without a body message
    pub validation: Option<String>,
    /// Message for 404 responses without a body message
    pub not_found: Option<String>,
}

/// Everything that distinguishes one admin list from another
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    /// Plural key, also the envelope field some endpoints use (`withdrawals`)
    pub name: String,
    /// Singular name used in messages (`withdrawal`)
    pub display_name: String,
    /// List endpoint
    pub list_path: String,
    /// Item endpoint; `{id}` is replaced with the record id
    pub item_path: String,
    /// Delete endpoint when it differs from `item_path`
    pub remove_path: Option<String>,
    /// Method used for partial updates
    pub mutate_method: Method,
    /// Page window parameters
    pub paging: PagingStyle,
    /// Page size of the first fetch
    pub page_size: u64,
    /// Lifetime of success and error notices
    pub notice_ttl: Duration,
    /// How long a controller waits for a request to settle
    pub await_timeout: Duration,
    /// Message overrides
    pub messages: ResourceMessages,
}

impl ResourceConfig {
    /// Resource with conventional paths below `list_path`
    ///
    /// Items live at `{list_path}/{id}` and are patched with `PATCH`.
    #[must_use]
    pub fn new(name: impl Into<String>, list_path: impl Into<String>) -> Self {
        let name = name.into();
        let list_path = list_path.into();
        let item_path = format!("{}/{{id}}", list_path.trim_end_matches('/'));
        Self {
            display_name: name.clone(),
            name,
            list_path,
            item_path,
            remove_path: None,
            mutate_method: Method::Patch,
            paging: PagingStyle::offset(),
            page_size: DEFAULT_PAGE_SIZE,
            notice_ttl: DEFAULT_NOTICE_TTL,
            await_timeout: DEFAULT_AWAIT_TIMEOUT,
            messages: ResourceMessages::default(),
        }
    }

    /// Set the singular name used in messages
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the item endpoint (must contain `{id}`)
    #[must_use]
    pub fn with_item_path(mut self, item_path: impl Into<String>) -> Self {
        self.item_path = item_path.into();
        self
    }

    /// Set a separate delete endpoint (must contain `{id}`)
    #[must_use]
    pub fn with_remove_path(mut self, remove_path: impl Into<String>) -> Self {
        self.remove_path = Some(remove_path.into());
        self
    }

    /// Set the method for partial updates
    #[must_use]
    pub const fn with_mutate_method(mut self, method: Method) -> Self {
        self.mutate_method = method;
        self
    }

    /// Set the page window parameters
    #[must_use]
    pub const fn with_paging(mut self, paging: PagingStyle) -> Self {
        self.paging = paging;
        self
    }

    /// Set the page size (at least 1)
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the notice lifetime
    #[must_use]
    pub const fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notice_ttl = ttl;
        self
    }

    /// Set how long operations wait for their request to settle
    #[must_use]
    pub const fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }

    /// Override the success notice after a mutation
    #[must_use]
    pub fn with_updated_message(mut self, message: impl Into<String>) -> Self {
        self.messages.updated = Some(message.into());
        self
    }

    /// Override the success notice after a removal
    #[must_use]
    pub fn with_removed_message(mut self, message: impl Into<String>) -> Self {
        self.messages.removed = Some(message.into());
        self
    }

    /// Override the 400 fallback message
    #[must_use]
    pub fn with_validation_message(mut self, message: impl Into<String>) -> Self {
        self.messages.validation = Some(message.into());
        self
    }

    /// Override the 404 fallback message
    #[must_use]
    pub fn with_not_found_message(mut self, message: impl Into<String>) -> Self {
        self.messages.not_found = Some(message.into());
        self
    }

    /// Take page size and timings from the process configuration
    #[must_use]
    pub fn with_console(self, console: &ConsoleConfig) -> Self {
        self.with_page_size(console.page_size)
            .with_notice_ttl(console.notice_ttl())
            .with_await_timeout(console.await_timeout())
    }

    /// Success notice after a mutation
    #[must_use]
    pub fn updated_message(&self) -> String {
        self.messages
            .updated
            .clone()
            .unwrap_or_else(|| format!("{} updated", self.display_name))
    }

    /// Success notice after a removal
    #[must_use]
    pub fn removed_message(&self) -> String {
        self.messages
            .removed
            .clone()
            .unwrap_or_else(|| format!("{} deleted", self.display_name))
    }

    /// Classification context for an operation on this resource
    #[must_use]
    pub fn error_context(&self, operation: Operation) -> ErrorContext {
        let validation = self
            .messages
            .validation
            .clone()
            .unwrap_or_else(|| format!("invalid {} data", self.display_name));
        let unknown = match operation {
            Operation::Fetch => format!("failed to load {}", self.name),
            Operation::Mutate => format!("failed to update {}", self.display_name),
            Operation::Remove => format!("failed to delete {}", self.display_name),
        };

        let context = ErrorContext::new(self.display_name.clone())
            .with_validation_fallback(validation)
            .with_unknown_fallback(unknown);
        match &self.messages.not_found {
            Some(message) => context.with_not_found(message.clone()),
            None => context,
        }
    }

    /// Path of one record, with the id percent-encoded as a single segment
    #[must_use]
    pub fn item_path_for(&self, id: &RecordId) -> String {
        fill_id(&self.item_path, id)
    }

    /// Request for one page of the list
    #[must_use]
    pub fn list_request(&self, query: &ListQuery) -> TransportRequest {
        TransportRequest::new(Method::Get, self.list_path.clone())
            .with_query_pairs(self.paging.query_pairs(query.limit, query.offset))
            .with_query_pairs(query.filters.query_pairs())
    }

    /// Request patching one record
    #[must_use]
    pub fn mutate_request(&self, id: &RecordId, payload: &Patch) -> TransportRequest {
        TransportRequest::new(self.mutate_method, self.item_path_for(id))
            .with_body(Value::Object(payload.clone()))
    }

    /// Request deleting one record
    #[must_use]
    pub fn remove_request(&self, id: &RecordId) -> TransportRequest {
        let path = self
            .remove_path
            .as_ref()
            .map_or_else(|| self.item_path_for(id), |path| fill_id(path, id));
        TransportRequest::new(Method::Delete, path)
    }
}

/// Substitute `{id}` in a path template
fn fill_id(template: &str, id: &RecordId) -> String {
    template.replace("{id}", &urlencoding::encode(id.as_str()))
}

/// Process-wide settings of the admin console
#[derive(Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Base URL of the admin API
    pub base_url: String,
    /// Static bearer token sent with every request
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Transport timeout in seconds
    pub request_timeout_secs: u64,
    /// Default page size
    pub page_size: u64,
    /// Notice lifetime in milliseconds
    pub notice_ttl_ms: u64,
    /// How long operations wait for their request to settle, in seconds
    pub await_timeout_secs: u64,
    /// Log filter (trace, debug, info, warn, error, or an `EnvFilter` directive)
    pub log_level: String,
}

impl ConsoleConfig {
    /// Load configuration from environment variables
    ///
    /// Missing or unparseable values fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("ADMIN_API_BASE_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.base_url),
            api_token: lookup("ADMIN_API_TOKEN").filter(|token| !token.trim().is_empty()),
            request_timeout_secs: lookup("ADMIN_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            page_size: lookup("ADMIN_PAGE_SIZE")
                .and_then(|s| s.trim().parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.page_size),
            notice_ttl_ms: lookup("ADMIN_NOTICE_TTL_MS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.notice_ttl_ms),
            await_timeout_secs: lookup("ADMIN_AWAIT_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.await_timeout_secs),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Transport timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Notice lifetime
    #[must_use]
    pub const fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }

    /// Settle timeout for controller operations
    #[must_use]
    pub const fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.await_timeout_secs)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            page_size: DEFAULT_PAGE_SIZE,
            notice_ttl_ms: 3000,
            await_timeout_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl std::fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("page_size", &self.page_size)
            .field("notice_ttl_ms", &self.notice_ttl_ms)
            .field("await_timeout_secs", &self.await_timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}
