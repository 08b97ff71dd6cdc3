//! Scriptable transport for tests and demos.
//!
//! Replies are queued up front and handed out in order. A reply can be
//! restricted to requests matching a predicate, and it can be held behind
//! a [`Gate`] so a test decides when the "server" answers. This is how
//! overlapping fetches are made to complete in a chosen order.

use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};

type Matcher = Box<dyn Fn(&TransportRequest) -> bool + Send + Sync>;

enum Reply {
    Respond(Result<TransportResponse, TransportError>),
    Panic,
    PanicOnSend,
}

struct Scripted {
    matcher: Option<Matcher>,
    gate: Option<oneshot::Receiver<()>>,
    reply: Reply,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Scripted>,
    requests: Vec<TransportRequest>,
}

/// Holds a scripted reply until opened
///
/// Dropping the gate releases the reply too.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    /// Let the held reply through
    pub fn open(self) {
        let _ = self.0.send(());
    }
}

/// In-memory [`Transport`] answering from a script
pub struct MockTransport {
    state: Mutex<MockState>,
    sent: watch::Sender<usize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockTransport")
            .field("scripted", &state.script.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl MockTransport {
    /// Transport with an empty script
    #[must_use]
    pub fn new() -> Self {
        let (sent, _) = watch::channel(0);
        Self {
            state: Mutex::new(MockState::default()),
            sent,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, matcher: Option<Matcher>, reply: Reply) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.lock().script.push_back(Scripted {
            matcher,
            gate: Some(rx),
            reply,
        });
        Gate(tx)
    }

    fn push_open(&self, matcher: Option<Matcher>, reply: Reply) {
        self.lock().script.push_back(Scripted {
            matcher,
            gate: None,
            reply,
        });
    }

    /// Queue a response for the next request
    pub fn reply(&self, response: TransportResponse) {
        self.push_open(None, Reply::Respond(Ok(response)));
    }

    /// Queue a failure with no response for the next request
    pub fn fail(&self, error: TransportError) {
        self.push_open(None, Reply::Respond(Err(error)));
    }

    /// Make the next request panic inside the transport
    pub fn panic_next(&self) {
        self.push_open(None, Reply::Panic);
    }

    /// Make the next `send` call itself panic, before any future exists
    pub fn panic_on_send(&self) {
        self.push_open(None, Reply::PanicOnSend);
    }

    /// Queue a response for the next request, held until the gate opens
    #[must_use = "the reply is released when the gate is opened or dropped"]
    pub fn reply_gated(&self, response: TransportResponse) -> Gate {
        self.push(None, Reply::Respond(Ok(response)))
    }

    /// Queue a response for the first request matching `matcher`
    pub fn reply_matching<F>(&self, matcher: F, response: TransportResponse)
    where
        F: Fn(&TransportRequest) -> bool + Send + Sync + 'static,
    {
        self.push_open(Some(Box::new(matcher)), Reply::Respond(Ok(response)));
    }

    /// Queue a gated response for the first request matching `matcher`
    #[must_use = "the reply is released when the gate is opened or dropped"]
    pub fn reply_matching_gated<F>(&self, matcher: F, response: TransportResponse) -> Gate
    where
        F: Fn(&TransportRequest) -> bool + Send + Sync + 'static,
    {
        self.push(Some(Box::new(matcher)), Reply::Respond(Ok(response)))
    }

    /// Every request received so far, in arrival order
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        *self.sent.borrow()
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        let mut rx = self.sent.subscribe();
        let _ = rx.wait_for(|sent| *sent >= count).await;
    }

    /// Record the request and take the first scripted reply that matches it
    fn take(&self, request: &TransportRequest) -> Option<Scripted> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let count = state.requests.len();
        let position = state
            .script
            .iter()
            .position(|entry| entry.matcher.as_ref().is_none_or(|matches| matches(request)));
        let entry = position.and_then(|index| state.script.remove(index));
        drop(state);

        self.sent.send_replace(count);
        entry
    }
}

impl Transport for MockTransport {
    #[allow(clippy::panic)]
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let entry = self.take(&request);
        if entry
            .as_ref()
            .is_some_and(|entry| matches!(entry.reply, Reply::PanicOnSend))
        {
            panic!("scripted transport panic in send");
        }
        async move {
            let Some(entry) = entry else {
                return Err(TransportError::Request(format!(
                    "no reply scripted for {} {}",
                    request.method, request.path
                )));
            };

            if let Some(gate) = entry.gate {
                let _ = gate.await;
            }

            match entry.reply {
                Reply::Respond(result) => result,
                Reply::Panic | Reply::PanicOnSend => panic!("scripted transport panic"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use serde_json::json;

    #[tokio::test]
    async fn replies_in_order_and_records_requests() {
        let transport = MockTransport::new();
        transport.reply(TransportResponse::new(200, json!([1])));
        transport.fail(TransportError::Timeout);

        let first = transport.send(TransportRequest::new(Method::Get, "/a")).await;
        let second = transport.send(TransportRequest::new(Method::Get, "/b")).await;
        let third = transport.send(TransportRequest::new(Method::Get, "/c")).await;

        assert_eq!(first.unwrap().status, 200);
        assert_eq!(second, Err(TransportError::Timeout));
        assert!(matches!(third, Err(TransportError::Request(_))));
        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.requests()[1].path, "/b");
    }

    #[tokio::test]
    async fn matcher_selects_reply() {
        let transport = MockTransport::new();
        transport.reply_matching(|r| r.path == "/b", TransportResponse::empty(204));
        transport.reply(TransportResponse::empty(200));

        let a = transport.send(TransportRequest::new(Method::Get, "/a")).await.unwrap();
        let b = transport.send(TransportRequest::new(Method::Get, "/b")).await.unwrap();
        assert_eq!(a.status, 200);
        assert_eq!(b.status, 204);
    }

    #[tokio::test]
    async fn gated_reply_waits_for_open() {
        let transport = std::sync::Arc::new(MockTransport::new());
        let gate = transport.reply_gated(TransportResponse::empty(200));

        let pending = tokio::spawn({
            let transport = std::sync::Arc::clone(&transport);
            async move { transport.send(TransportRequest::new(Method::Get, "/slow")).await }
        });

        transport.wait_for_requests(1).await;
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        gate.open();
        assert_eq!(pending.await.unwrap().unwrap().status, 200);
    }
}
