//! Header names and protocol constants shared by the executor and the commands.

/// Version reported to the server in [`CLIENT_VERSION_HEADER`].
pub const CLIENT_VERSION: &str = "5.4.0";

pub const CLIENT_VERSION_HEADER: &str = "Raven-Client-Version";
pub const TOPOLOGY_ETAG_HEADER: &str = "Topology-Etag";
pub const CLIENT_CONFIGURATION_ETAG_HEADER: &str = "Client-Configuration-Etag";
pub const REFRESH_TOPOLOGY_HEADER: &str = "Refresh-Topology";
pub const REFRESH_CLIENT_CONFIGURATION_HEADER: &str = "Refresh-Client-Configuration";
pub const DATABASE_MISSING_HEADER: &str = "Database-Missing";

/// Cluster tag given to nodes that were built from seed urls rather than
/// reported by the server.
pub const UNKNOWN_CLUSTER_TAG: &str = "!";
