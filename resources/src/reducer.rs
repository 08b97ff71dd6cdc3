//! The resource reducer.
//!
//! All list state transitions happen here, one action at a time, under the
//! store's lock. Requests run as effects and report back with completion
//! actions.
//!
//! # Last write wins
//!
//! Every fetch carries a [`RequestId`] allocated at issue time. The reducer
//! remembers the latest one it accepted and applies a completion only if it
//! belongs to that fetch. A completion from an earlier fetch, however late
//! it arrives, leaves the state untouched. A fetch whose id is not newer
//! than the latest accepted one is refused with `FetchDiscarded`.
//!
//! # Mutations
//!
//! Mutations and removals are applied only after the server acknowledged
//! them: the returned record (or the sent payload) is merged into the page,
//! or the record is dropped and the total decremented. Failures set the
//! error and an error notice and leave the items alone.

use crate::config::ResourceConfig;
use crate::error::ClassifiedError;
use crate::executor::RequestExecutor;
use crate::merge::{merge_in_place, remove_in_place};
use crate::notice::NoticeKind;
use crate::telemetry;
use crate::transport::Transport;
use crate::types::{ListStatus, PaginationCursor, RequestId, ResourceAction, ResourceState};
use resource_sync_core::async_effect;
use resource_sync_core::effect::Effect;
use resource_sync_core::environment::Clock;
use resource_sync_core::reducer::Reducer;
use resource_sync_core::{SmallVec, smallvec};
use std::marker::PhantomData;
use std::sync::Arc;

/// Dependencies of [`ResourceReducer`]
pub struct ResourceEnvironment<T> {
    /// Runs requests for this resource
    pub executor: RequestExecutor<T>,
    /// Time source for notice expiry timestamps
    pub clock: Arc<dyn Clock>,
    /// The resource being synchronized
    pub config: Arc<ResourceConfig>,
}

impl<T: Transport> ResourceEnvironment<T> {
    /// Environment for `config` over `transport`
    #[must_use]
    pub fn new(transport: Arc<T>, config: Arc<ResourceConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            executor: RequestExecutor::new(transport, Arc::clone(&config)),
            clock,
            config,
        }
    }
}

impl<T> Clone for ResourceEnvironment<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

/// Reducer shared by every resource; the resource is in the environment
pub struct ResourceReducer<T> {
    _transport: PhantomData<fn() -> T>,
}

impl<T> ResourceReducer<T> {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _transport: PhantomData,
        }
    }
}

impl<T> Default for ResourceReducer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResourceReducer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ResourceReducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResourceReducer")
    }
}

impl<T: Transport> ResourceReducer<T> {
    fn notify(
        state: &mut ResourceState,
        env: &ResourceEnvironment<T>,
        kind: NoticeKind,
        message: String,
    ) -> Effect<ResourceAction> {
        state.notice.show(
            kind,
            message,
            env.config.notice_ttl,
            env.clock.now(),
            |generation| ResourceAction::NoticeExpired { generation },
        )
    }

    fn mutation_failed(
        state: &mut ResourceState,
        env: &ResourceEnvironment<T>,
        error: ClassifiedError,
    ) -> Effect<ResourceAction> {
        let message = error.message.clone();
        state.error = Some(error);
        Self::notify(state, env, NoticeKind::Error, message)
    }

    fn is_stale(state: &ResourceState, request_id: RequestId) -> bool {
        state.latest_fetch.is_some_and(|latest| request_id <= latest)
    }
}

impl<T: Transport> Reducer for ResourceReducer<T> {
    type State = ResourceState;
    type Action = ResourceAction;
    type Environment = ResourceEnvironment<T>;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // FetchList: supersede whatever fetch came before
            // ═══════════════════════════════════════════════════════════════
            ResourceAction::FetchList { request_id, query } => {
                if Self::is_stale(state, request_id) {
                    tracing::warn!(
                        %request_id,
                        latest = ?state.latest_fetch,
                        "Fetch arrived after a newer one; discarding"
                    );
                    return smallvec![async_effect! {
                        Some(ResourceAction::FetchDiscarded { request_id })
                    }];
                }

                tracing::debug!(
                    %request_id,
                    resource = %env.config.name,
                    offset = query.offset,
                    "Fetch issued"
                );
                state.latest_fetch = Some(request_id);
                state.fetch_in_flight = Some(request_id);
                state.status = ListStatus::Loading;
                state.error = None;
                state.filters = query.filters.clone();
                state.last_query = Some(query.clone());

                let executor = env.executor.clone();
                smallvec![async_effect! {
                    let result = executor.fetch(&query).await;
                    Some(ResourceAction::FetchCompleted { request_id, query, result })
                }]
            },

            // ═══════════════════════════════════════════════════════════════
            // FetchCompleted: apply only the latest issued fetch
            // ═══════════════════════════════════════════════════════════════
            ResourceAction::FetchCompleted {
                request_id,
                query,
                result,
            } => {
                if state.latest_fetch != Some(request_id) {
                    tracing::debug!(
                        %request_id,
                        latest = ?state.latest_fetch,
                        "Superseded fetch completed; result dropped"
                    );
                    metrics::counter!(
                        telemetry::SUPERSEDED_FETCHES_TOTAL,
                        "resource" => env.config.name.clone()
                    )
                    .increment(1);
                    return smallvec![Effect::None];
                }

                state.fetch_in_flight = None;
                match result {
                    Ok(page) => {
                        state.items = page.items;
                        state.cursor = page.cursor;
                        state.status = ListStatus::Ready;
                        state.error = None;
                    },
                    Err(error) => {
                        // Never keep stale rows next to an error banner
                        state.items.clear();
                        state.cursor = PaginationCursor::new(0, query.limit, query.offset);
                        state.status = ListStatus::Failed;
                        state.error = Some(error);
                    },
                }
                smallvec![Effect::None]
            },

            ResourceAction::FetchDiscarded { .. } => smallvec![Effect::None],

            // ═══════════════════════════════════════════════════════════════
            // Mutate / Remove: run the request, apply on acknowledgement
            // ═══════════════════════════════════════════════════════════════
            ResourceAction::Mutate {
                request_id,
                id,
                payload,
            } => {
                tracing::debug!(%request_id, %id, "Mutation issued");
                state.pending_mutations += 1;

                let executor = env.executor.clone();
                smallvec![async_effect! {
                    let result = executor.mutate(&id, &payload).await;
                    Some(ResourceAction::MutateCompleted { request_id, id, payload, result })
                }]
            },

            ResourceAction::MutateCompleted {
                id, payload, result, ..
            } => {
                state.pending_mutations = state.pending_mutations.saturating_sub(1);
                match result {
                    Ok(updated) => {
                        let patch = updated.map_or(payload, |record| record.into_fields());
                        if !merge_in_place(&mut state.items, &id, &patch) {
                            tracing::debug!(%id, "Updated record is not on the current page");
                        }
                        smallvec![Self::notify(
                            state,
                            env,
                            NoticeKind::Success,
                            env.config.updated_message()
                        )]
                    },
                    Err(error) => smallvec![Self::mutation_failed(state, env, error)],
                }
            },

            ResourceAction::Remove { request_id, id } => {
                tracing::debug!(%request_id, %id, "Removal issued");
                state.pending_mutations += 1;

                let executor = env.executor.clone();
                smallvec![async_effect! {
                    let result = executor.remove(&id).await;
                    Some(ResourceAction::RemoveCompleted { request_id, id, result })
                }]
            },

            ResourceAction::RemoveCompleted { id, result, .. } => {
                state.pending_mutations = state.pending_mutations.saturating_sub(1);
                match result {
                    Ok(()) => {
                        if !remove_in_place(&mut state.items, &id) {
                            tracing::debug!(%id, "Removed record is not on the current page");
                        }
                        // The server deleted it either way
                        state.cursor.record_removed();
                        smallvec![Self::notify(
                            state,
                            env,
                            NoticeKind::Success,
                            env.config.removed_message()
                        )]
                    },
                    Err(error) => smallvec![Self::mutation_failed(state, env, error)],
                }
            },

            // ═══════════════════════════════════════════════════════════════
            // Errors and notices
            // ═══════════════════════════════════════════════════════════════
            ResourceAction::ResetError => {
                state.error = None;
                let showing_error = state
                    .notice
                    .current()
                    .is_some_and(|notice| notice.kind == NoticeKind::Error);
                if showing_error {
                    smallvec![state.notice.reset()]
                } else {
                    smallvec![Effect::None]
                }
            },

            ResourceAction::ShowNotice { kind, message, ttl } => {
                smallvec![state.notice.show(
                    kind,
                    message,
                    ttl,
                    env.clock.now(),
                    |generation| ResourceAction::NoticeExpired { generation }
                )]
            },

            ResourceAction::DismissNotice => smallvec![state.notice.reset()],

            ResourceAction::NoticeExpired { generation } => {
                if state.notice.expire(generation) {
                    tracing::trace!(generation, "Notice expired");
                }
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::id::RecordId;
    use crate::mocks::MockTransport;
    use crate::notice::NOTICE_TIMER;
    use crate::types::{FilterSet, ListPage, ListQuery, Patch, Record};
    use resource_sync_testing::{ReducerTest, assertions, test_clock};
    use serde_json::{Value, json};
    use std::time::Duration;

    type TestReducer = ResourceReducer<MockTransport>;

    fn env() -> ResourceEnvironment<MockTransport> {
        let config = ResourceConfig::new("withdrawals", "/admin/withdrawals")
            .with_display_name("Withdrawal")
            .with_notice_ttl(Duration::from_secs(3));
        ResourceEnvironment::new(
            Arc::new(MockTransport::new()),
            Arc::new(config),
            Arc::new(test_clock()),
        )
    }

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    fn patch(value: Value) -> Patch {
        value.as_object().cloned().unwrap()
    }

    fn query(status: &str) -> ListQuery {
        ListQuery::new(FilterSet::new().with("status", status), 10)
    }

    fn page(items: Value, total: u64) -> ListPage {
        ListPage {
            items: records(items),
            cursor: PaginationCursor::new(total, 10, 0),
        }
    }

    fn ready_state() -> ResourceState {
        let mut state = ResourceState::new(10);
        state.items = records(json!([
            {"id": 5, "status": "pending"},
            {"id": 7, "status": "pending"},
            {"id": 9, "status": "approved"},
            {"id": 11, "status": "pending"},
            {"id": 13, "status": "pending"}
        ]));
        state.cursor = PaginationCursor::new(5, 10, 0);
        state.status = ListStatus::Ready;
        state
    }

    #[test]
    fn fetch_enters_loading() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(1),
                query: query("pending"),
            })
            .then_state(|state| {
                assert_eq!(state.status, ListStatus::Loading);
                assert!(state.is_loading());
                assert_eq!(state.filters.get("status"), Some("pending"));
                assert_eq!(state.latest_fetch, Some(RequestId::new(1)));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn fetch_success_populates_items() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(1),
                query: query("pending"),
            })
            .when_action(ResourceAction::FetchCompleted {
                request_id: RequestId::new(1),
                query: query("pending"),
                result: Ok(page(json!([{"id": 1}, {"id": 2}, {"id": 3}]), 3)),
            })
            .then_state(|state| {
                assert_eq!(state.status, ListStatus::Ready);
                assert_eq!(state.items.len(), 3);
                assert!(!state.cursor.has_more);
                assert!(!state.is_loading());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn fetch_failure_clears_items() {
        let error = ClassifiedError::new(ErrorKind::ServerError, "server error – try again later");
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ready_state())
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(1),
                query: query("approved"),
            })
            .when_action(ResourceAction::FetchCompleted {
                request_id: RequestId::new(1),
                query: query("approved"),
                result: Err(error.clone()),
            })
            .then_state(move |state| {
                assert_eq!(state.status, ListStatus::Failed);
                assert!(state.items.is_empty());
                assert_eq!(state.error.as_ref(), Some(&error));
                assert_eq!(state.cursor.total, 0);
                assert!(!state.is_loading());
            })
            .run();
    }

    #[test]
    fn later_issued_fetch_wins_regardless_of_completion_order() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(1),
                query: query("pending"),
            })
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(2),
                query: query("approved"),
            })
            .when_action(ResourceAction::FetchCompleted {
                request_id: RequestId::new(2),
                query: query("approved"),
                result: Ok(page(json!([{"id": "b"}]), 1)),
            })
            .when_action(ResourceAction::FetchCompleted {
                request_id: RequestId::new(1),
                query: query("pending"),
                result: Ok(page(json!([{"id": "a1"}, {"id": "a2"}]), 2)),
            })
            .then_state(|state| {
                assert_eq!(state.items.len(), 1);
                assert!(state.items[0].has_id(&RecordId::from("b")));
                assert_eq!(state.filters.get("status"), Some("approved"));
                assert_eq!(state.status, ListStatus::Ready);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn superseded_fetch_keeps_loading_until_latest_completes() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(1),
                query: query("pending"),
            })
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(2),
                query: query("approved"),
            })
            .when_action(ResourceAction::FetchCompleted {
                request_id: RequestId::new(1),
                query: query("pending"),
                result: Ok(page(json!([{"id": 1}]), 1)),
            })
            .then_state(|state| {
                assert!(state.items.is_empty());
                assert_eq!(state.status, ListStatus::Loading);
                assert_eq!(state.fetch_in_flight, Some(RequestId::new(2)));
            })
            .run();
    }

    #[test]
    fn out_of_order_fetch_is_refused() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(5),
                query: query("approved"),
            })
            .when_action(ResourceAction::FetchList {
                request_id: RequestId::new(4),
                query: query("pending"),
            })
            .then_state(|state| {
                assert_eq!(state.latest_fetch, Some(RequestId::new(5)));
                assert_eq!(state.filters.get("status"), Some("approved"));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn mutate_success_merges_and_notifies() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ready_state())
            .when_action(ResourceAction::Mutate {
                request_id: RequestId::new(1),
                id: RecordId::from(7),
                payload: patch(json!({"status": "approved"})),
            })
            .when_action(ResourceAction::MutateCompleted {
                request_id: RequestId::new(1),
                id: RecordId::from(7),
                payload: patch(json!({"status": "approved"})),
                result: Ok(None),
            })
            .then_state(|state| {
                let before = ready_state();
                assert_eq!(state.items.len(), 5);
                assert_eq!(
                    state.items[1].clone().into_value(),
                    json!({"id": 7, "status": "approved"})
                );
                for index in [0, 2, 3, 4] {
                    assert_eq!(state.items[index], before.items[index]);
                }
                assert_eq!(state.status, ListStatus::Ready);
                assert_eq!(state.pending_mutations, 0);
                let notice = state.notice.current().unwrap();
                assert_eq!(notice.kind, NoticeKind::Success);
                assert_eq!(notice.message, "Withdrawal updated");
            })
            .then_effects(|effects| assertions::assert_has_cancellable(effects, &NOTICE_TIMER))
            .run();
    }

    #[test]
    fn mutate_prefers_server_record() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ready_state())
            .when_action(ResourceAction::MutateCompleted {
                request_id: RequestId::new(1),
                id: RecordId::from("7"),
                payload: patch(json!({"status": "approved"})),
                result: Ok(Some(Record::new(patch(
                    json!({"id": 7, "status": "approved", "processedBy": "admin"}),
                )))),
            })
            .then_state(|state| {
                assert_eq!(state.items[1].get("processedBy"), Some(&json!("admin")));
            })
            .run();
    }

    #[test]
    fn mutate_failure_leaves_items() {
        let error = ClassifiedError::new(ErrorKind::ConflictError, "wallet address already registered");
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ready_state())
            .when_action(ResourceAction::MutateCompleted {
                request_id: RequestId::new(1),
                id: RecordId::from(7),
                payload: patch(json!({"status": "approved"})),
                result: Err(error.clone()),
            })
            .then_state(move |state| {
                assert_eq!(state.items, ready_state().items);
                assert_eq!(state.status, ListStatus::Ready);
                assert_eq!(state.error.as_ref(), Some(&error));
                let notice = state.notice.current().unwrap();
                assert_eq!(notice.kind, NoticeKind::Error);
                assert_eq!(notice.message, "wallet address already registered");
            })
            .run();
    }

    #[test]
    fn remove_drops_record_and_decrements_total() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ready_state())
            .when_action(ResourceAction::Remove {
                request_id: RequestId::new(1),
                id: RecordId::from(7),
            })
            .when_action(ResourceAction::RemoveCompleted {
                request_id: RequestId::new(1),
                id: RecordId::from(7),
                result: Ok(()),
            })
            .then_state(|state| {
                assert_eq!(state.items.len(), 4);
                assert_eq!(state.cursor.total, 4);
                assert!(state.find(&RecordId::from(7)).is_none());
                assert_eq!(
                    state.notice.current().map(|n| n.message.as_str()),
                    Some("Withdrawal deleted")
                );
            })
            .run();
    }

    #[test]
    fn remove_keeps_asserted_next_page() {
        let mut state = ResourceState::new(10);
        state.items = records(json!((1..=10).map(|id| json!({"id": id})).collect::<Vec<_>>()));
        state.cursor = PaginationCursor::asserted(10, 10, 0, true);
        state.status = ListStatus::Ready;

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ResourceAction::RemoveCompleted {
                request_id: RequestId::new(1),
                id: RecordId::from(3),
                result: Ok(()),
            })
            .then_state(|state| {
                assert_eq!(state.items.len(), 9);
                assert_eq!(state.cursor.total, 9);
                assert!(state.cursor.has_more);
                assert_eq!(state.cursor.next_offset(), Some(10));
            })
            .run();
    }

    #[test]
    fn reset_error_dismisses_error_notice_only() {
        let mut state = ready_state();
        state.error = Some(ClassifiedError::new(ErrorKind::ServerError, "x"));
        let _ = state.notice.show::<ResourceAction, _>(
            NoticeKind::Error,
            "x",
            Duration::from_secs(3),
            test_clock().now(),
            |generation| ResourceAction::NoticeExpired { generation },
        );

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ResourceAction::ResetError)
            .then_state(|state| {
                assert!(state.error.is_none());
                assert!(state.notice.current().is_none());
            })
            .then_effects(|effects| assertions::assert_cancels(effects, &NOTICE_TIMER))
            .run();

        let mut state = ready_state();
        let _ = state.notice.show::<ResourceAction, _>(
            NoticeKind::Success,
            "saved",
            Duration::from_secs(3),
            test_clock().now(),
            |generation| ResourceAction::NoticeExpired { generation },
        );
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ResourceAction::ResetError)
            .then_state(|state| assert!(state.notice.current().is_some()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn second_show_replaces_timer_and_stale_expiry_is_ignored() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::ShowNotice {
                kind: NoticeKind::Success,
                message: "first".to_string(),
                ttl: Duration::from_secs(3),
            })
            .when_action(ResourceAction::ShowNotice {
                kind: NoticeKind::Success,
                message: "second".to_string(),
                ttl: Duration::from_secs(3),
            })
            .when_action(ResourceAction::NoticeExpired { generation: 1 })
            .then_state(|state| {
                assert_eq!(state.notice.current().map(|n| n.message.as_str()), Some("second"));
                assert_eq!(state.notice.generation(), 2);
            })
            .run();
    }

    #[test]
    fn dismiss_cancels_timer() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(ResourceState::new(10))
            .when_action(ResourceAction::ShowNotice {
                kind: NoticeKind::Success,
                message: "saved".to_string(),
                ttl: Duration::from_secs(3),
            })
            .when_action(ResourceAction::DismissNotice)
            .then_state(|state| assert!(state.notice.current().is_none()))
            .then_effects(|effects| assertions::assert_cancels(effects, &NOTICE_TIMER))
            .run();
    }
}
