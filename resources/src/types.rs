//! State, actions and value types for resource controllers.

use crate::error::ClassifiedError;
use crate::id::RecordId;
use crate::notice::{NoticeKind, NoticeSlot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A partial record: the fields to overwrite on a match
pub type Patch = Map<String, Value>;

/// An opaque server entity
///
/// Business fields are never interpreted. Only the identifier is read, from
/// `id` or, failing that, `_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Wrap a JSON object
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value if it is an object
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Canonical identifier of this record
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.0
            .get("id")
            .and_then(RecordId::from_value)
            .or_else(|| self.0.get("_id").and_then(RecordId::from_value))
    }

    /// Whether this record is identified by `id`
    #[must_use]
    pub fn has_id(&self, id: &RecordId) -> bool {
        self.id().is_some_and(|own| own == *id)
    }

    /// Read a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow-merge `patch` into this record; patch fields win
    pub fn apply(&mut self, patch: &Patch) {
        for (key, value) in patch {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Unwrap into a JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Unwrap into the field map
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Filter constraints passed verbatim to the list endpoint
///
/// Keys map to query parameters. Blank values mean "no constraint" and are
/// not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, String>);

impl FilterSet {
    /// No constraints
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a constraint, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Drop a constraint
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Read a constraint
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether there are no effective constraints
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Constraints as query parameters, skipping blank values
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Self::new();
        for (key, value) in iter {
            filters.insert(key, value);
        }
        filters
    }
}

/// One list request: filters plus the page window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Filter constraints
    pub filters: FilterSet,
    /// Page size, at least 1
    pub limit: u64,
    /// Records to skip
    pub offset: u64,
}

impl ListQuery {
    /// First page of `filters`
    #[must_use]
    pub fn new(filters: FilterSet, limit: u64) -> Self {
        Self {
            filters,
            limit: limit.max(1),
            offset: 0,
        }
    }

    /// Same filters and page size, different offset
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// 1-based page number of this window
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.offset / self.limit + 1
    }
}

/// Canonical pagination position
///
/// `has_more` is `offset + limit < total` unless the server asserted it and
/// gave no total to check against. In that case `total` only counts the
/// records seen so far and `total_known` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationCursor {
    /// Total matching records on the server
    pub total: u64,
    /// Page size, at least 1
    pub limit: u64,
    /// Records skipped
    pub offset: u64,
    /// Whether a further page exists
    pub has_more: bool,
    /// Whether `total` came from the server rather than from counting rows
    #[serde(default)]
    pub total_known: bool,
}

impl PaginationCursor {
    /// Cursor with `has_more` derived from the other three fields
    #[must_use]
    pub fn new(total: u64, limit: u64, offset: u64) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            limit,
            offset,
            has_more: Self::derive_has_more(total, limit, offset),
            total_known: true,
        }
    }

    /// Cursor trusting a server-asserted `has_more` (no reliable total)
    #[must_use]
    pub fn asserted(total: u64, limit: u64, offset: u64, has_more: bool) -> Self {
        Self {
            total,
            limit: limit.max(1),
            offset,
            has_more,
            total_known: false,
        }
    }

    /// Cursor of a list that has not been fetched yet
    #[must_use]
    pub fn empty(limit: u64) -> Self {
        Self::asserted(0, limit, 0, false)
    }

    /// `offset + limit < total`, without overflow
    #[must_use]
    pub const fn derive_has_more(total: u64, limit: u64, offset: u64) -> bool {
        offset.saturating_add(limit) < total
    }

    /// 1-based page number
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.offset / self.limit + 1
    }

    /// Number of pages needed for `total` (at least 1)
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.limit)
        }
    }

    /// Offset of the next page, if there is one
    #[must_use]
    pub const fn next_offset(&self) -> Option<u64> {
        if self.has_more {
            Some(self.offset.saturating_add(self.limit))
        } else {
            None
        }
    }

    /// Offset of the previous page, if this is not the first
    #[must_use]
    pub const fn previous_offset(&self) -> Option<u64> {
        if self.offset == 0 {
            None
        } else {
            Some(self.offset.saturating_sub(self.limit))
        }
    }

    /// Account for one record deleted on the server
    ///
    /// An asserted `has_more` is kept: a counted total says nothing about
    /// later pages.
    pub fn record_removed(&mut self) {
        self.total = self.total.saturating_sub(1);
        if self.total_known {
            self.has_more = Self::derive_has_more(self.total, self.limit, self.offset);
        }
    }
}

/// One decoded page of a list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    /// Records in server order
    pub items: Vec<Record>,
    /// Normalized position
    pub cursor: PaginationCursor,
}

/// Lifecycle of a controller's list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListStatus {
    /// Never fetched
    #[default]
    Idle,
    /// A fetch is in flight
    Loading,
    /// The latest fetch succeeded
    Ready,
    /// The latest fetch failed; items are empty
    Failed,
}

/// Which request an executor is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List fetch
    Fetch,
    /// Partial update of one record
    Mutate,
    /// Deletion of one record
    Remove,
}

impl Operation {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Mutate => "mutate",
            Self::Remove => "remove",
        }
    }
}

/// Issue-order identifier of a request
///
/// Ids are strictly increasing per controller, so comparing two ids tells
/// which request was issued later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw sequence number
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw sequence number
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of increasing [`RequestId`]s
#[derive(Debug, Default)]
pub struct RequestSequence(AtomicU64);

impl RequestSequence {
    /// Sequence starting at 1
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Allocate the next id
    pub fn next_id(&self) -> RequestId {
        RequestId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Everything a screen renders for one resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    /// Records of the current page, in server order
    pub items: Vec<Record>,
    /// Position of the current page
    pub cursor: PaginationCursor,
    /// Filters of the latest issued fetch
    pub filters: FilterSet,
    /// List lifecycle
    pub status: ListStatus,
    /// Latest failure, shown as a banner
    pub error: Option<ClassifiedError>,
    /// Transient notice with its expiry timer
    pub notice: NoticeSlot,
    /// Most recently issued fetch; only its completion is applied
    #[serde(skip)]
    pub latest_fetch: Option<RequestId>,
    /// The latest fetch, while it has not completed
    #[serde(skip)]
    pub fetch_in_flight: Option<RequestId>,
    /// Mutations and removals awaiting a response
    #[serde(skip)]
    pub pending_mutations: usize,
    /// Query of the latest issued fetch, for refresh and paging
    #[serde(skip)]
    pub last_query: Option<ListQuery>,
}

impl ResourceState {
    /// Empty state for a list with the given page size
    #[must_use]
    pub fn new(page_size: u64) -> Self {
        Self {
            items: Vec::new(),
            cursor: PaginationCursor::empty(page_size),
            filters: FilterSet::new(),
            status: ListStatus::Idle,
            error: None,
            notice: NoticeSlot::default(),
            latest_fetch: None,
            fetch_in_flight: None,
            pending_mutations: 0,
            last_query: None,
        }
    }

    /// Whether any request of this controller is outstanding
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.fetch_in_flight.is_some() || self.pending_mutations > 0
    }

    /// Find a record of the current page
    #[must_use]
    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.items.iter().find(|record| record.has_id(id))
    }
}

/// Commands sent to a resource controller and the events its effects produce
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceAction {
    // Commands
    /// Fetch a page, superseding any fetch issued earlier
    FetchList {
        /// Issue-order id
        request_id: RequestId,
        /// Filters and window
        query: ListQuery,
    },
    /// Patch one record on the server, then merge the result locally
    Mutate {
        /// Issue-order id
        request_id: RequestId,
        /// Record to patch
        id: RecordId,
        /// Fields to send
        payload: Patch,
    },
    /// Delete one record on the server, then drop it locally
    Remove {
        /// Issue-order id
        request_id: RequestId,
        /// Record to delete
        id: RecordId,
    },
    /// Clear the error banner and any error notice
    ResetError,
    /// Show a transient notice
    ShowNotice {
        /// Success or error
        kind: NoticeKind,
        /// Text to display
        message: String,
        /// Time until it clears itself
        ttl: Duration,
    },
    /// Clear the notice now
    DismissNotice,

    // Events
    /// A fetch finished
    FetchCompleted {
        /// Id of the fetch
        request_id: RequestId,
        /// Query it ran
        query: ListQuery,
        /// Decoded page or classified failure
        result: Result<ListPage, ClassifiedError>,
    },
    /// A fetch was refused because a later one had already been issued
    FetchDiscarded {
        /// Id of the refused fetch
        request_id: RequestId,
    },
    /// A mutation finished
    MutateCompleted {
        /// Id of the mutation
        request_id: RequestId,
        /// Record it targeted
        id: RecordId,
        /// Fields that were sent
        payload: Patch,
        /// Updated record from the server, if it returned one
        result: Result<Option<Record>, ClassifiedError>,
    },
    /// A removal finished
    RemoveCompleted {
        /// Id of the removal
        request_id: RequestId,
        /// Record it targeted
        id: RecordId,
        /// Acknowledgement or classified failure
        result: Result<(), ClassifiedError>,
    },
    /// A notice timer fired
    NoticeExpired {
        /// Generation of the notice the timer was armed for
        generation: u64,
    },
}

impl ResourceAction {
    /// Whether this is the completion event of `request_id`
    #[must_use]
    pub fn completes(&self, request_id: RequestId) -> bool {
        match self {
            Self::FetchCompleted { request_id: id, .. }
            | Self::FetchDiscarded { request_id: id }
            | Self::MutateCompleted { request_id: id, .. }
            | Self::RemoveCompleted { request_id: id, .. } => *id == request_id,
            _ => false,
        }
    }
}
