use reqwest::Url;
use serde::Deserialize;

use crate::constants::UNKNOWN_CLUSTER_TAG;

/// A single database node of a cluster.
///
/// Nodes are identified by their url and database name; the cluster tag and role are carried
/// along for routing decisions and diagnostics but do not take part in equality.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerNode {
    pub url: Url,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub cluster_tag: String,
    #[serde(default)]
    pub server_role: ServerRole,
}

impl ServerNode {
    pub fn new(url: Url, database: Option<String>) -> Self {
        Self {
            url,
            database,
            cluster_tag: String::default(),
            server_role: ServerRole::default(),
        }
    }

    /// Creates a node from a seed url before any topology has been downloaded.
    pub fn from_seed_url(url: Url, database: Option<String>) -> Self {
        Self {
            cluster_tag: UNKNOWN_CLUSTER_TAG.to_string(),
            ..Self::new(url, database)
        }
    }

    pub fn with_cluster_tag(mut self, cluster_tag: &str) -> Self {
        self.cluster_tag = cluster_tag.to_string();
        self
    }

    pub fn with_server_role(mut self, server_role: ServerRole) -> Self {
        self.server_role = server_role;
        self
    }
}

impl PartialEq for ServerNode {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.database == other.database
    }
}

impl Eq for ServerNode {}

impl std::hash::Hash for ServerNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.database.hash(state);
    }
}

impl std::fmt::Display for ServerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{} ({}) [{}]", self.url, database, self.cluster_tag),
            None => write!(f, "{} [{}]", self.url, self.cluster_tag),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
pub enum ServerRole {
    #[default]
    None,
    Promotable,
    Member,
    Watcher,
    Rehab,
}
