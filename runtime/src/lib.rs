//! # Resource Sync Runtime
//!
//! Runtime implementation for reducer-driven resource controllers.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Keeps at most one live effect per [`EffectId`]
//!
//! ## Example
//!
//! ```ignore
//! use resource_sync_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use resource_sync_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Metric names recorded by the runtime
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Number of effect-produced actions buffered for observers
const ACTION_BROADCAST_CAPACITY: usize = 64;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects spawned by
/// that action. Effects produced by feedback actions are not tracked.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait().await;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    ///
    /// Aborted effects count as complete.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: counter + notifier shared by every effect spawned for one action
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Created before the task is spawned so that aborting a task which never
/// got polled still releases its slot.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Internal: a live cancellable effect
struct CancellableEntry {
    token: u64,
    abort: tokio::task::AbortHandle,
}

/// Internal: registry of live cancellable effects, one per id
#[derive(Default)]
struct CancellableRegistry {
    next_token: u64,
    live: HashMap<EffectId, CancellableEntry>,
}

impl CancellableRegistry {
    fn record_live(&self) {
        #[allow(clippy::cast_precision_loss)]
        ::metrics::gauge!(metrics::CANCELLABLE_EFFECTS_LIVE).set(self.live.len() as f64);
    }
}

type SharedRegistry = Arc<Mutex<CancellableRegistry>>;

fn lock_registry(registry: &SharedRegistry) -> std::sync::MutexGuard<'_, CancellableRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Internal: removes a finished cancellable from the registry
///
/// Only removes the entry if it still belongs to this task; a replacement
/// registered under the same id is left alone.
struct RegistrationGuard {
    registry: SharedRegistry,
    id: EffectId,
    token: u64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let mut registry = lock_registry(&self.registry);
        if registry
            .live
            .get(&self.id)
            .is_some_and(|entry| entry.token == self.token)
        {
            registry.live.remove(&self.id);
            registry.record_live();
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        ACTION_BROADCAST_CAPACITY, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize,
        CancellableEntry, CancellableRegistry, DecrementGuard, Duration, Effect, EffectHandle,
        EffectId, EffectTracking, Mutex, Ordering, Reducer, RegistrationGuard, RwLock,
        SharedRegistry, StoreError, lock_registry, metrics,
    };
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::broadcast;

    type DriveFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (state transitions)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and keyed cancellation)
    ///
    /// Clones share the same state, registry, and broadcast channel.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellables: SharedRegistry,
        /// Actions produced by effects, published after they were reduced.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (action_broadcast, _) = broadcast::channel(ACTION_BROADCAST_CAPACITY);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellables: Arc::new(Mutex::new(CancellableRegistry::default())),
                action_broadcast,
            }
        }

        /// Number of effect tasks currently running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Number of cancellable effects currently registered
        #[must_use]
        pub fn live_cancellables(&self) -> usize {
            lock_registry(&self.cancellables).live.len()
        }

        /// Whether an effect is currently registered under `id`
        #[must_use]
        pub fn is_live(&self, id: &EffectId) -> bool {
            lock_registry(&self.cancellables).live.contains_key(id)
        }

        /// Abort the cancellable effect registered under `id`
        ///
        /// Returns `true` if a live effect was aborted.
        pub fn cancel(&self, id: &EffectId) -> bool {
            let entry = {
                let mut registry = lock_registry(&self.cancellables);
                let entry = registry.live.remove(id);
                registry.record_live();
                entry
            };
            let Some(entry) = entry else {
                return false;
            };
            entry.abort.abort();
            ::metrics::counter!(metrics::EFFECTS_CANCELLED_TOTAL).increment(1);
            tracing::debug!(effect_id = %id, "Cancelled effect");
            true
        }

        /// Abort every registered cancellable effect
        ///
        /// Returns the number of effects aborted.
        pub fn cancel_all(&self) -> usize {
            let entries: Vec<CancellableEntry> = {
                let mut registry = lock_registry(&self.cancellables);
                let entries = registry.live.drain().map(|(_, entry)| entry).collect();
                registry.record_live();
                entries
            };
            let aborted = entries.len();
            for entry in entries {
                entry.abort.abort();
            }
            if aborted > 0 {
                ::metrics::counter!(metrics::EFFECTS_CANCELLED_TOTAL).increment(aborted as u64);
                tracing::debug!(aborted, "Cancelled all keyed effects");
            }
            aborted
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, aborts keyed effects (timers have nothing left
        /// to report once the owner is gone), then waits for the remaining
        /// effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);
            self.cancel_all();

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Concurrent `send()` calls serialize at the reducer.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                ::metrics::counter!(metrics::REJECTED_ACTIONS_TOTAL).increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            ::metrics::counter!(metrics::ACTIONS_TOTAL).increment(1);
            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                ::metrics::histogram!(metrics::REDUCER_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
                effects
            };

            tracing::trace!("Reducer returned {} effects", effects.len());
            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by effects
        ///
        /// Subscribes before sending, so a fast effect cannot be missed. The
        /// matching action has already been reduced when it is returned.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects
        ///
        /// Only feedback actions are broadcast, never the actions passed to
        /// `send` directly. Each is published after the reducer applied it.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let item_count = store.state(|s| s.items.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Start one effect returned by the reducer
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            ::metrics::counter!(metrics::EFFECTS_EXECUTED_TOTAL, "type" => effect.kind())
                .increment(1);

            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Cancel(id) => {
                    self.cancel(&id);
                },
                Effect::Cancellable { id, effect } => {
                    self.spawn_cancellable(id, *effect, tracking);
                },
                effect => {
                    let fut = self.drive(effect, tracking.clone());
                    self.spawn_tracked(tracking, fut);
                },
            }
        }

        /// Spawn `fut` with effect and shutdown accounting
        fn spawn_tracked(
            &self,
            tracking: &EffectTracking,
            fut: DriveFuture,
        ) -> tokio::task::JoinHandle<()> {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);

            let guard = DecrementGuard(tracking.clone());
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;
                fut.await;
            })
        }

        /// Register and spawn a keyed effect, aborting the one it replaces
        fn spawn_cancellable(&self, id: EffectId, effect: Effect<A>, tracking: &EffectTracking) {
            // Held across spawn + insert so a fast task cannot deregister
            // before it was registered.
            let mut registry = lock_registry(&self.cancellables);
            registry.next_token += 1;
            let token = registry.next_token;

            let registration = RegistrationGuard {
                registry: Arc::clone(&self.cancellables),
                id: id.clone(),
                token,
            };
            let inner = self.drive(effect, tracking.clone());
            let fut: DriveFuture = Box::pin(async move {
                let _registration = registration;
                inner.await;
            });
            let handle = self.spawn_tracked(tracking, fut);

            let replaced = registry.live.insert(
                id.clone(),
                CancellableEntry {
                    token,
                    abort: handle.abort_handle(),
                },
            );
            registry.record_live();
            drop(registry);

            if let Some(previous) = replaced {
                previous.abort.abort();
                ::metrics::counter!(metrics::EFFECTS_CANCELLED_TOTAL).increment(1);
                tracing::debug!(effect_id = %id, "Replaced live effect");
            }
        }

        /// Build the future that runs an effect to completion
        fn drive(&self, effect: Effect<A>, tracking: EffectTracking) -> DriveFuture {
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay elapsed, sending action");
                        store.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        let futures = effects
                            .into_iter()
                            .map(|effect| store.drive(effect, tracking.clone()));
                        futures::future::join_all(futures).await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            store.drive(effect, tracking.clone()).await;
                        }
                    },
                    Effect::Cancellable { id, effect } => {
                        store.spawn_cancellable(id, *effect, &tracking);
                    },
                    Effect::Cancel(id) => {
                        store.cancel(&id);
                    },
                }
            })
        }

        /// Reduce an effect-produced action, then publish it to observers
        async fn feed_back(&self, action: A) {
            match self.send(action.clone()).await {
                Ok(_) => {
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::debug!(%error, "Dropped feedback action");
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellables: Arc::clone(&self.cancellables),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
