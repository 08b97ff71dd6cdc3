//! Metric names and descriptions for the Store runtime.
//!
//! The runtime only records through the [`metrics`] facade. Installing a
//! recorder/exporter is left to the embedding application.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Actions processed by stores
pub const ACTIONS_TOTAL: &str = "store.actions.total";

/// Actions rejected because the store was shutting down
pub const REJECTED_ACTIONS_TOTAL: &str = "store.actions.rejected";

/// Effects started, labelled by `type`
pub const EFFECTS_EXECUTED_TOTAL: &str = "store.effects.executed";

/// Cancellable effects aborted (replaced, cancelled, or torn down)
pub const EFFECTS_CANCELLED_TOTAL: &str = "store.effects.cancelled";

/// Currently registered cancellable effects
pub const CANCELLABLE_EFFECTS_LIVE: &str = "store.effects.cancellable_live";

/// Reducer execution time
pub const REDUCER_DURATION_SECONDS: &str = "store.reducer.duration_seconds";

/// Register descriptions for all store metrics.
///
/// Safe to call more than once; descriptions are idempotent in the facade.
pub fn describe_store_metrics() {
    describe_counter!(ACTIONS_TOTAL, "Total number of actions processed by stores");
    describe_counter!(
        REJECTED_ACTIONS_TOTAL,
        "Actions rejected because the store was shutting down"
    );
    describe_counter!(
        EFFECTS_EXECUTED_TOTAL,
        "Total number of effects started, by effect type"
    );
    describe_counter!(
        EFFECTS_CANCELLED_TOTAL,
        "Cancellable effects aborted before completion"
    );
    describe_gauge!(
        CANCELLABLE_EFFECTS_LIVE,
        "Cancellable effects currently registered in a store"
    );
    describe_histogram!(REDUCER_DURATION_SECONDS, "Time taken to execute reducers");
}
