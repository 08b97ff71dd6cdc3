//! Runs one request and turns whatever happens into a typed result.
//!
//! Every failure mode of the transport (no response, non-2xx status, a
//! panic inside the transport future) becomes a [`ClassifiedError`], so the
//! reducer always receives a completion event and never leaves the loading
//! flag set.

use crate::classify::{Outcome, classify};
use crate::config::ResourceConfig;
use crate::envelope::{ListEnvelope, decode_record};
use crate::error::ClassifiedError;
use crate::id::RecordId;
use crate::pagination::normalize_envelope;
use crate::telemetry;
use crate::transport::{Transport, TransportRequest};
use crate::types::{ListPage, ListQuery, Operation, Patch, Record};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Issues fetches, mutations and removals for one resource
pub struct RequestExecutor<T> {
    transport: Arc<T>,
    config: Arc<ResourceConfig>,
}

impl<T> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> std::fmt::Debug for RequestExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("resource", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> RequestExecutor<T> {
    /// Executor sending through `transport` with the endpoints of `config`
    #[must_use]
    pub const fn new(transport: Arc<T>, config: Arc<ResourceConfig>) -> Self {
        Self { transport, config }
    }

    /// The resource this executor serves
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Fetch one page and normalize it
    ///
    /// # Errors
    ///
    /// Returns the classified failure when the request did not succeed.
    /// Unrecognized success bodies are not errors; they decode as an empty page.
    #[tracing::instrument(
        name = "resource.fetch",
        skip_all,
        fields(resource = %self.config.name, limit = query.limit, offset = query.offset)
    )]
    pub async fn fetch(&self, query: &ListQuery) -> Result<ListPage, ClassifiedError> {
        let body = self
            .dispatch(Operation::Fetch, self.config.list_request(query))
            .await?;

        let envelope = ListEnvelope::decode(body.as_ref(), &self.config.name);
        if envelope == ListEnvelope::Unrecognized && body.is_some() {
            tracing::warn!("List response has no recognizable items; treating it as empty");
        }

        let cursor = normalize_envelope(&envelope, query.limit, query.offset);
        let items = envelope.into_records();
        tracing::debug!(items = items.len(), total = cursor.total, "Fetched page");
        Ok(ListPage { items, cursor })
    }

    /// Patch one record
    ///
    /// Returns the updated record when the server sent one back.
    ///
    /// # Errors
    ///
    /// Returns the classified failure when the request did not succeed.
    #[tracing::instrument(
        name = "resource.mutate",
        skip_all,
        fields(resource = %self.config.name, id = %id)
    )]
    pub async fn mutate(
        &self,
        id: &RecordId,
        payload: &Patch,
    ) -> Result<Option<Record>, ClassifiedError> {
        let body = self
            .dispatch(Operation::Mutate, self.config.mutate_request(id, payload))
            .await?;
        Ok(decode_record(body.as_ref(), id))
    }

    /// Delete one record
    ///
    /// # Errors
    ///
    /// Returns the classified failure when the request did not succeed.
    #[tracing::instrument(
        name = "resource.remove",
        skip_all,
        fields(resource = %self.config.name, id = %id)
    )]
    pub async fn remove(&self, id: &RecordId) -> Result<(), ClassifiedError> {
        self.dispatch(Operation::Remove, self.config.remove_request(id))
            .await
            .map(|_| ())
    }

    /// Send a request and classify anything but a 2xx response
    async fn dispatch(
        &self,
        operation: Operation,
        request: TransportRequest,
    ) -> Result<Option<Value>, ClassifiedError> {
        let resource = self.config.name.clone();
        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "resource" => resource.clone(),
            "operation" => operation.as_str()
        )
        .increment(1);

        tracing::debug!(method = %request.method, path = %request.path, "Dispatching request");
        let started = Instant::now();
        let context = self.config.error_context(operation);

        // `send` itself may panic before it hands back a future
        let sending = async { self.transport.send(request).await };
        let result = match AssertUnwindSafe(sending).catch_unwind().await
        {
            Ok(Ok(response)) if response.is_success() => Ok(response.body),
            Ok(Ok(response)) => Err(classify(
                Outcome::Status {
                    status: response.status,
                    body: response.body.as_ref(),
                },
                &context,
            )),
            Ok(Err(error)) => {
                tracing::debug!(%error, "No response from server");
                Err(classify(Outcome::NoResponse, &context))
            },
            Err(_) => {
                tracing::error!("Transport panicked while sending request");
                Err(context.unknown())
            },
        };

        metrics::histogram!(
            telemetry::REQUEST_DURATION_SECONDS,
            "resource" => resource.clone(),
            "operation" => operation.as_str()
        )
        .record(started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            tracing::warn!(kind = %error.kind, message = %error.message, "Request failed");
            metrics::counter!(
                telemetry::ERRORS_TOTAL,
                "resource" => resource,
                "kind" => error.kind.as_str()
            )
            .increment(1);
        }

        result
    }
}
