//! The per-screen facade over one resource.
//!
//! A [`ResourceController`] owns a store running the resource reducer. Each
//! operation allocates a [`RequestId`], sends the command and waits for the
//! matching completion event, which the store publishes only after it has
//! been reduced. Callers therefore observe the updated state as soon as an
//! operation returns.
//!
//! Dropping the controller cancels every keyed effect it still owns, so a
//! pending notice timer never outlives its screen.

use crate::config::ResourceConfig;
use crate::error::{ClassifiedError, ResourceError};
use crate::id::RecordId;
use crate::notice::{NOTICE_TIMER, Notice, NoticeKind};
use crate::reducer::{ResourceEnvironment, ResourceReducer};
use crate::transport::Transport;
use crate::types::{
    FilterSet, ListQuery, ListStatus, PaginationCursor, Patch, Record, RequestId,
    RequestSequence, ResourceAction, ResourceState,
};
use resource_sync_core::environment::{Clock, SystemClock};
use resource_sync_runtime::Store;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type ResourceStore<T> =
    Store<ResourceState, ResourceAction, ResourceEnvironment<T>, ResourceReducer<T>>;

/// Synchronizes one admin list with the server
pub struct ResourceController<T: Transport> {
    store: ResourceStore<T>,
    requests: RequestSequence,
    config: Arc<ResourceConfig>,
}

impl<T: Transport> std::fmt::Debug for ResourceController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceController")
            .field("resource", &self.config.name)
            .field("pending_effects", &self.store.pending_effects())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ResourceController<T> {
    /// Controller for `config`, sending through `transport`
    #[must_use]
    pub fn new(config: ResourceConfig, transport: Arc<T>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Controller with an explicit clock for notice timestamps
    #[must_use]
    pub fn with_clock(config: ResourceConfig, transport: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);
        let environment = ResourceEnvironment::new(transport, Arc::clone(&config), clock);
        let store = Store::new(
            ResourceState::new(config.page_size),
            ResourceReducer::new(),
            environment,
        );

        Self {
            store,
            requests: RequestSequence::new(),
            config,
        }
    }

    /// The resource this controller synchronizes
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fetching
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetch the first page for `filters`
    ///
    /// Supersedes any fetch issued earlier: whatever that fetch returns is
    /// never applied.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::Request`]: the fetch failed; the list is now empty
    /// - [`ResourceError::Superseded`]: a newer fetch was issued before this one settled
    /// - [`ResourceError::Store`]: the controller is shutting down or timed out
    pub async fn fetch_list(&self, filters: FilterSet) -> Result<PaginationCursor, ResourceError> {
        let limit = self.current_limit().await;
        self.fetch(ListQuery::new(filters, limit)).await
    }

    /// Fetch an explicit window
    ///
    /// # Errors
    ///
    /// Same as [`fetch_list`](Self::fetch_list).
    pub async fn fetch(&self, query: ListQuery) -> Result<PaginationCursor, ResourceError> {
        let request_id = self.requests.next_id();
        let completion = self
            .await_completion(request_id, ResourceAction::FetchList { request_id, query })
            .await?;

        let applied = self
            .store
            .state(|state| state.latest_fetch == Some(request_id))
            .await;

        match completion {
            ResourceAction::FetchCompleted { result, .. } if applied => result
                .map(|page| page.cursor)
                .map_err(ResourceError::Request),
            _ => Err(ResourceError::Superseded),
        }
    }

    /// Re-issue the latest query, or fetch the first page if there was none
    ///
    /// # Errors
    ///
    /// Same as [`fetch_list`](Self::fetch_list).
    pub async fn refresh(&self) -> Result<PaginationCursor, ResourceError> {
        let last = self.store.state(|state| state.last_query.clone()).await;
        match last {
            Some(query) => self.fetch(query).await,
            None => self.fetch_list(FilterSet::new()).await,
        }
    }

    /// Fetch the window at `offset` with the current filters
    ///
    /// # Errors
    ///
    /// Same as [`fetch_list`](Self::fetch_list).
    pub async fn load_page(&self, offset: u64) -> Result<PaginationCursor, ResourceError> {
        // Offsets are multiples of the server's page size, not the requested one
        let query = self
            .store
            .state(|state| ListQuery::new(state.filters.clone(), state.cursor.limit))
            .await;
        self.fetch(query.with_offset(offset)).await
    }

    /// Fetch the next page; `Ok(None)` when there is none
    ///
    /// # Errors
    ///
    /// Same as [`fetch_list`](Self::fetch_list).
    pub async fn next_page(&self) -> Result<Option<PaginationCursor>, ResourceError> {
        match self.store.state(|state| state.cursor.next_offset()).await {
            Some(offset) => self.load_page(offset).await.map(Some),
            None => Ok(None),
        }
    }

    /// Fetch the previous page; `Ok(None)` on the first page
    ///
    /// # Errors
    ///
    /// Same as [`fetch_list`](Self::fetch_list).
    pub async fn previous_page(&self) -> Result<Option<PaginationCursor>, ResourceError> {
        match self.store.state(|state| state.cursor.previous_offset()).await {
            Some(offset) => self.load_page(offset).await.map(Some),
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Patch a record on the server, then merge the result into the page
    ///
    /// Returns the record as it now appears on the page, or `None` when it
    /// is not on the current page.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::Request`]: the server refused; items are unchanged
    /// - [`ResourceError::Store`]: the controller is shutting down or timed out
    pub async fn mutate(
        &self,
        id: impl Into<RecordId>,
        payload: Patch,
    ) -> Result<Option<Record>, ResourceError> {
        let id = id.into();
        let request_id = self.requests.next_id();
        let completion = self
            .await_completion(request_id, ResourceAction::Mutate {
                request_id,
                id: id.clone(),
                payload,
            })
            .await?;

        match completion {
            ResourceAction::MutateCompleted { result: Err(error), .. } => {
                Err(ResourceError::Request(error))
            },
            _ => Ok(self.store.state(|state| state.find(&id).cloned()).await),
        }
    }

    /// Set a record's `status` field (approve, reject, ban, ...)
    ///
    /// # Errors
    ///
    /// Same as [`mutate`](Self::mutate).
    pub async fn set_status(
        &self,
        id: impl Into<RecordId>,
        status: impl Into<String>,
    ) -> Result<Option<Record>, ResourceError> {
        let mut payload = Patch::new();
        payload.insert("status".to_string(), Value::String(status.into()));
        self.mutate(id, payload).await
    }

    /// Delete a record on the server, then drop it from the page
    ///
    /// # Errors
    ///
    /// - [`ResourceError::Request`]: the server refused; items are unchanged
    /// - [`ResourceError::Store`]: the controller is shutting down or timed out
    pub async fn remove(&self, id: impl Into<RecordId>) -> Result<(), ResourceError> {
        let request_id = self.requests.next_id();
        let completion = self
            .await_completion(request_id, ResourceAction::Remove {
                request_id,
                id: id.into(),
            })
            .await?;

        match completion {
            ResourceAction::RemoveCompleted { result: Err(error), .. } => {
                Err(ResourceError::Request(error))
            },
            _ => Ok(()),
        }
    }

    async fn await_completion(
        &self,
        request_id: RequestId,
        action: ResourceAction,
    ) -> Result<ResourceAction, ResourceError> {
        Ok(self
            .store
            .send_and_wait_for(
                action,
                move |candidate| candidate.completes(request_id),
                self.config.await_timeout,
            )
            .await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Errors and notices
    // ═══════════════════════════════════════════════════════════════════════

    /// Clear the error banner and any error notice
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Store`] if the controller is shutting down.
    pub async fn reset_error(&self) -> Result<(), ResourceError> {
        self.store.send(ResourceAction::ResetError).await?;
        Ok(())
    }

    /// Show a notice for the configured lifetime, replacing any current one
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Store`] if the controller is shutting down.
    pub async fn show_notice(
        &self,
        kind: NoticeKind,
        message: impl Into<String>,
    ) -> Result<(), ResourceError> {
        self.show_notice_for(kind, message, self.config.notice_ttl)
            .await
    }

    /// Show a notice for `ttl`, replacing any current one
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Store`] if the controller is shutting down.
    pub async fn show_notice_for(
        &self,
        kind: NoticeKind,
        message: impl Into<String>,
        ttl: Duration,
    ) -> Result<(), ResourceError> {
        self.store
            .send(ResourceAction::ShowNotice {
                kind,
                message: message.into(),
                ttl,
            })
            .await?;
        Ok(())
    }

    /// Clear the notice now
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Store`] if the controller is shutting down.
    pub async fn dismiss_notice(&self) -> Result<(), ResourceError> {
        self.store.send(ResourceAction::DismissNotice).await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reading state
    // ═══════════════════════════════════════════════════════════════════════

    /// Copy of the whole list state
    pub async fn snapshot(&self) -> ResourceState {
        self.store.state(ResourceState::clone).await
    }

    /// Records of the current page
    pub async fn items(&self) -> Vec<Record> {
        self.store.state(|state| state.items.clone()).await
    }

    /// Position of the current page
    pub async fn cursor(&self) -> PaginationCursor {
        self.store.state(|state| state.cursor).await
    }

    /// The current error, if any
    pub async fn error(&self) -> Option<ClassifiedError> {
        self.store.state(|state| state.error.clone()).await
    }

    /// The visible notice, if any
    pub async fn notice(&self) -> Option<Notice> {
        self.store.state(|state| state.notice.current().cloned()).await
    }

    /// List lifecycle
    pub async fn status(&self) -> ListStatus {
        self.store.state(|state| state.status).await
    }

    /// Whether any request is outstanding
    pub async fn is_loading(&self) -> bool {
        self.store.state(ResourceState::is_loading).await
    }

    /// Events produced by this controller's requests and timers
    ///
    /// Each event is published after it was applied, so a subscriber can
    /// re-render from [`snapshot`](Self::snapshot) on every message.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceAction> {
        self.store.subscribe_actions()
    }

    /// Whether the notice timer is currently armed
    #[must_use]
    pub fn has_pending_notice_timer(&self) -> bool {
        self.store.is_live(&NOTICE_TIMER)
    }

    /// Number of keyed timers currently running
    #[must_use]
    pub fn live_timers(&self) -> usize {
        self.store.live_cancellables()
    }

    /// Stop accepting operations and wait for outstanding requests
    ///
    /// Keyed effects such as the notice timer are cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Store`] if requests are still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ResourceError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }

    async fn current_limit(&self) -> u64 {
        self.store.state(|state| state.cursor.limit).await
    }
}

impl<T: Transport> Drop for ResourceController<T> {
    fn drop(&mut self) {
        let cancelled = self.store.cancel_all();
        if cancelled > 0 {
            tracing::debug!(
                resource = %self.config.name,
                cancelled,
                "Controller dropped; cancelled pending timers"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::MockTransport;
    use crate::transport::TransportResponse;
    use resource_sync_testing::test_clock;
    use serde_json::json;

    fn controller(transport: &Arc<MockTransport>) -> ResourceController<MockTransport> {
        let config = ResourceConfig::new("users", "/admin/users").with_page_size(10);
        ResourceController::with_clock(config, Arc::clone(transport), Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn starts_idle_and_empty() {
        let transport = Arc::new(MockTransport::new());
        let controller = controller(&transport);
        assert_eq!(controller.status().await, ListStatus::Idle);
        assert!(controller.items().await.is_empty());
        assert!(!controller.is_loading().await);
        assert_eq!(controller.cursor().await, PaginationCursor::empty(10));
    }

    #[tokio::test]
    async fn paging_reuses_filters() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(TransportResponse::new(
            200,
            json!({"data": [{"id": 1}], "pagination": {"total": 25, "limit": 10}}),
        ));
        transport.reply(TransportResponse::new(
            200,
            json!({"data": [{"id": 11}], "pagination": {"total": 25, "limit": 10}}),
        ));
        transport.reply(TransportResponse::new(
            200,
            json!({"data": [{"id": 1}], "pagination": {"total": 25, "limit": 10}}),
        ));

        let controller = controller(&transport);
        let first = controller
            .fetch_list(FilterSet::new().with("role", "artist"))
            .await
            .unwrap();
        assert!(first.has_more);

        let second = controller.next_page().await.unwrap().unwrap();
        assert_eq!(second.offset, 10);

        let back = controller.previous_page().await.unwrap().unwrap();
        assert_eq!(back.offset, 0);
        assert_eq!(controller.previous_page().await.unwrap(), None);

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|r| r.query_value("role") == Some("artist")));
        assert_eq!(sent[1].query_value("offset"), Some("10"));
    }

    #[tokio::test]
    async fn next_page_without_more_is_noop() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(TransportResponse::new(200, json!([{"id": 1}])));
        let controller = controller(&transport);
        controller.fetch_list(FilterSet::new()).await.unwrap();
        assert_eq!(controller.next_page().await.unwrap(), None);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn refresh_repeats_last_query() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(TransportResponse::new(200, json!([{"id": 1}])));
        transport.reply(TransportResponse::new(200, json!([{"id": 1}, {"id": 2}])));

        let controller = controller(&transport);
        controller
            .fetch_list(FilterSet::new().with("status", "banned"))
            .await
            .unwrap();
        let cursor = controller.refresh().await.unwrap();

        assert_eq!(cursor.total, 2);
        assert_eq!(transport.requests()[1].query_value("status"), Some("banned"));
    }

    #[tokio::test]
    async fn set_status_sends_status_patch() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(TransportResponse::new(200, json!([{"id": 3, "status": "active"}])));
        transport.reply(TransportResponse::new(200, json!({"success": true})));

        let controller = controller(&transport);
        controller.fetch_list(FilterSet::new()).await.unwrap();
        let updated = controller.set_status(3, "banned").await.unwrap().unwrap();

        assert_eq!(updated.get("status"), Some(&json!("banned")));
        assert_eq!(transport.requests()[1].body, Some(json!({"status": "banned"})));
    }

    #[tokio::test]
    async fn shutdown_rejects_further_operations() {
        let transport = Arc::new(MockTransport::new());
        let controller = controller(&transport);
        controller.shutdown(Duration::from_secs(1)).await.unwrap();
        let error = controller.fetch_list(FilterSet::new()).await.unwrap_err();
        assert!(matches!(error, ResourceError::Store(_)));
    }
}
