//! # Resource Sync
//!
//! Controllers that keep an admin console's record lists in step with the
//! server.
//!
//! Each list screen (users, withdrawals, purchases, ...) owns one
//! [`ResourceController`]. The controller fetches pages, applies the result
//! of the most recently issued fetch only, merges confirmed mutations into
//! the visible page, turns every failure into a [`ClassifiedError`] and
//! shows transient notices that expire on their own.
//!
//! ## Layers
//!
//! - **Pure helpers**: [`classify`], [`pagination`], [`envelope`], [`merge`]
//! - **Reducer**: [`ResourceReducer`] owns every state transition
//! - **Executor**: [`RequestExecutor`] runs one request and classifies its outcome
//! - **Controller**: [`ResourceController`] drives the reducer through a store
//! - **Transports**: [`HttpTransport`] for real servers, [`mocks::MockTransport`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use resource_sync::{catalog, ConsoleConfig, FilterSet, HttpTransport, ResourceController};
//! use std::sync::Arc;
//!
//! let console = ConsoleConfig::from_env();
//! let transport = Arc::new(HttpTransport::from_config(&console)?);
//! let withdrawals = ResourceController::new(catalog::withdrawals().with_console(&console), transport);
//!
//! let cursor = withdrawals
//!     .fetch_list(FilterSet::new().with("status", "pending"))
//!     .await?;
//! withdrawals.set_status(7, "approved").await?;
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod http;
pub mod id;
pub mod merge;
pub mod mocks;
pub mod notice;
pub mod pagination;
pub mod reducer;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use classify::{ErrorContext, Outcome, classify};
pub use config::{ConsoleConfig, PagingStyle, ResourceConfig};
pub use controller::ResourceController;
pub use error::{ClassifiedError, ErrorKind, ResourceError};
pub use executor::RequestExecutor;
pub use http::HttpTransport;
pub use id::RecordId;
pub use notice::{Notice, NoticeKind};
pub use pagination::normalize;
pub use reducer::{ResourceEnvironment, ResourceReducer};
pub use telemetry::describe_metrics;
pub use transport::{Method, Transport, TransportError, TransportRequest, TransportResponse};
pub use types::{
    FilterSet, ListPage, ListQuery, ListStatus, PaginationCursor, Patch, Record, RequestId,
    ResourceAction, ResourceState,
};
