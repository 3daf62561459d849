//! Notifications published by a [`RequestExecutor`](crate::RequestExecutor).
//!
//! Events go out over a broadcast channel. Publishing never waits for subscribers and a
//! lagging or missing subscriber never affects how a request is executed.
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    BeforeRequest {
        database: Option<String>,
        url: String,
    },
    SucceedRequest {
        database: Option<String>,
        url: String,
        status: u16,
    },
    FailedRequest {
        database: Option<String>,
        url: String,
        error: String,
    },
    TopologyUpdated {
        database: Option<String>,
        etag: i64,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct RequestEventPublisher {
    sender: broadcast::Sender<RequestEvent>,
}

impl RequestEventPublisher {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    pub(crate) fn publish(&self, event: RequestEvent) {
        // No receivers is the common case.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.sender.subscribe()
    }
}
