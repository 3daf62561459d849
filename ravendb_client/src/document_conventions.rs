use std::time::Duration;

use crate::{http_compression::HttpCompressionAlgorithm, node_selector::ReadBalanceBehavior};

/// Client-side settings that shape how requests are routed, retried and encoded.
#[derive(Clone, Debug)]
pub struct DocumentConventions {
    disable_topology_updates: bool,
    read_balance_behavior: ReadBalanceBehavior,
    request_timeout: Duration,
    topology_refresh_interval: Duration,
    speed_test_interval: Duration,
    fastest_node_epsilon: Duration,
    failed_node_check_interval: Duration,
    use_compression: bool,
    http_compression_algorithm: HttpCompressionAlgorithm,
    send_application_identifier: bool,
}

impl Default for DocumentConventions {
    fn default() -> Self {
        Self {
            disable_topology_updates: false,
            read_balance_behavior: ReadBalanceBehavior::None,
            request_timeout: Duration::from_secs(30),
            topology_refresh_interval: Duration::from_secs(5 * 60),
            speed_test_interval: Duration::from_secs(60),
            fastest_node_epsilon: Duration::from_millis(5),
            failed_node_check_interval: Duration::from_secs(5),
            use_compression: true,
            http_compression_algorithm: HttpCompressionAlgorithm::default(),
            send_application_identifier: true,
        }
    }
}

// Mutators
impl DocumentConventions {
    /// Conventions for talking to exactly one server and never following topology changes.
    pub fn default_for_single_server() -> Self {
        Self {
            disable_topology_updates: true,
            send_application_identifier: false,
            ..Default::default()
        }
    }

    pub fn set_disable_topology_updates(mut self, disable: bool) -> Self {
        self.disable_topology_updates = disable;
        self
    }

    pub fn set_read_balance_behavior(mut self, behavior: ReadBalanceBehavior) -> Self {
        self.read_balance_behavior = behavior;
        self
    }

    pub fn set_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn set_topology_refresh_interval(mut self, interval: Duration) -> Self {
        self.topology_refresh_interval = interval;
        self
    }

    pub fn set_speed_test_interval(mut self, interval: Duration) -> Self {
        self.speed_test_interval = interval;
        self
    }

    /// Nodes whose measured latency is within `epsilon` of the fastest count as equally fast.
    pub fn set_fastest_node_epsilon(mut self, epsilon: Duration) -> Self {
        self.fastest_node_epsilon = epsilon;
        self
    }

    pub fn set_failed_node_check_interval(mut self, interval: Duration) -> Self {
        self.failed_node_check_interval = interval;
        self
    }

    pub fn set_use_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    pub fn set_http_compression_algorithm(mut self, algorithm: HttpCompressionAlgorithm) -> Self {
        self.http_compression_algorithm = algorithm;
        self
    }

    pub fn set_send_application_identifier(mut self, send: bool) -> Self {
        self.send_application_identifier = send;
        self
    }
}

// Getters
impl DocumentConventions {
    pub fn disable_topology_updates(&self) -> bool {
        self.disable_topology_updates
    }

    pub fn read_balance_behavior(&self) -> ReadBalanceBehavior {
        self.read_balance_behavior
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn topology_refresh_interval(&self) -> Duration {
        self.topology_refresh_interval
    }

    pub fn speed_test_interval(&self) -> Duration {
        self.speed_test_interval
    }

    pub fn fastest_node_epsilon(&self) -> Duration {
        self.fastest_node_epsilon
    }

    pub fn failed_node_check_interval(&self) -> Duration {
        self.failed_node_check_interval
    }

    pub fn use_compression(&self) -> bool {
        self.use_compression
    }

    /// Algorithm for request bodies, or `None` when compression is off.
    pub fn request_compression(&self) -> Option<HttpCompressionAlgorithm> {
        self.use_compression.then_some(self.http_compression_algorithm)
    }

    pub fn send_application_identifier(&self) -> bool {
        self.send_application_identifier
    }
}
