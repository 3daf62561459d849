mod request_executor_actor;
mod request_executor_configuration;
mod request_executor_error;
mod request_executor_handle;
mod request_executor_state;

pub use request_executor_configuration::*;
pub use request_executor_handle::RequestExecutor;

use std::time::Duration;

use tokio::sync::oneshot;

/// Work the background actor of a [`RequestExecutor`] performs on request.
#[derive(Debug)]
pub(crate) enum RequestExecutorMessage {
    /// Fetch a fresh topology from any reachable node.
    UpdateTopology { force_update: bool },
    /// Fetch the server-side client configuration.
    UpdateClientConfiguration,
    /// Measure node latencies now instead of waiting for the next speed-test tick.
    SpeedTest,
    /// Stop every background task and shut the actor down.
    Dispose { respond_to: oneshot::Sender<()> },
}

/// Per-call options for [`RequestExecutor::execute_with_options`].
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Pins reads to one node per session when reads are round-robined.
    pub session_id: Option<i32>,
    /// Serve cacheable reads straight from the cache when the entry is younger than this.
    pub aggressive_cache: Option<Duration>,
    /// Overrides both the command timeout and the default request timeout.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_session_id(mut self, session_id: i32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_aggressive_cache(mut self, duration: Duration) -> Self {
        self.aggressive_cache = Some(duration);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
