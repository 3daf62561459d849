use serde::Deserialize;

use crate::server_node::ServerNode;

/// A versioned list of the nodes serving a database.
///
/// Topologies are never mutated once built; a newer one replaces the old one wholesale.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Topology {
    /// Represents the latest version of the topology
    pub etag: i64,
    /// Holds the nodes, in the order the server prefers them.
    pub nodes: Vec<ServerNode>,
}

impl Topology {
    pub fn new(etag: i64, nodes: Vec<ServerNode>) -> Self {
        Self { etag, nodes }
    }

    /// Whether this topology should replace `current`.
    pub fn supersedes(&self, current: &Topology) -> bool {
        self.etag > current.etag
    }

    /// Returns the first node that does not belong to `database`, if any.
    ///
    /// A server-wide topology (`database` is `None`) accepts any node.
    pub fn find_foreign_node(&self, database: Option<&str>) -> Option<&ServerNode> {
        let database = database?;
        self.nodes
            .iter()
            .find(|node| node.database.as_deref().map_or(false, |db| db != database))
    }
}
