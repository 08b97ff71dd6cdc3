//! Metric names and descriptions for resource controllers.

use metrics::{describe_counter, describe_histogram};

/// Requests dispatched, labelled by `resource` and `operation`
pub const REQUESTS_TOTAL: &str = "resource.requests.total";

/// Classified failures, labelled by `resource` and `kind`
pub const ERRORS_TOTAL: &str = "resource.errors.total";

/// Time from dispatch to classified outcome, labelled by `resource` and `operation`
pub const REQUEST_DURATION_SECONDS: &str = "resource.request.duration_seconds";

/// Fetch results dropped because a newer fetch had been issued
pub const SUPERSEDED_FETCHES_TOTAL: &str = "resource.fetches.superseded";

/// Register descriptions for resource and store metrics
pub fn describe_metrics() {
    resource_sync_runtime::metrics::describe_store_metrics();
    describe_counter!(REQUESTS_TOTAL, "Requests dispatched by resource controllers");
    describe_counter!(ERRORS_TOTAL, "Failed requests by classified error kind");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        "Time from request dispatch to classified outcome"
    );
    describe_counter!(
        SUPERSEDED_FETCHES_TOTAL,
        "Fetch results discarded because a newer fetch was issued"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_namespaced() {
        for name in [
            REQUESTS_TOTAL,
            ERRORS_TOTAL,
            REQUEST_DURATION_SECONDS,
            SUPERSEDED_FETCHES_TOTAL,
        ] {
            assert!(name.starts_with("resource."));
        }
        describe_metrics();
    }
}
