//! Cluster-wide topology as reported by `GET /cluster/topology`.
//!
//! Used by administrative commands and by server-wide executors, which route to the cluster
//! members instead of to the nodes of a single database.
use std::collections::HashMap;

use reqwest::Url;
use serde::Deserialize;

use crate::{
    server_node::{ServerNode, ServerRole},
    topology::Topology,
};

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopologyInfo {
    pub topology: ClusterTopology,
    pub etag: i64,
    pub leader: Option<String>,
    pub leader_ship_duration: i64,
    pub current_state: NodeState,
    pub node_tag: String,
    pub current_term: i64,
    pub last_state_change_reason: Option<String>,
    pub status: HashMap<String, NodeStatus>,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopology {
    pub topology_id: String,
    pub all_nodes: HashMap<String, Url>,
    pub members: HashMap<String, Url>,
    pub promotables: HashMap<String, Url>,
    pub watchers: HashMap<String, Url>,
    pub last_node_id: String,
    pub etag: i64,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeStatus {
    pub name: Option<String>,
    pub connected: bool,
    pub error_details: Option<String>,
    pub last_sent: Option<String>,
    pub last_sent_message: Option<String>,
    pub last_matching_index: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Undefined,
    Passive,
    Candidate,
    Follower,
    #[serde(rename = "Leader-Elect")]
    LeaderElect,
    Leader,
}

impl ClusterTopologyInfo {
    /// Builds a routable [`Topology`] out of the cluster members.
    ///
    /// The leader, when known, goes first so that writes from a server-wide executor land on it.
    /// Remaining members follow in tag order.
    pub fn to_server_topology(&self) -> Topology {
        Topology::new(
            self.etag,
            create_server_nodes_from_cluster_topology(&self.topology, self.leader.as_deref()),
        )
    }
}

pub fn create_server_nodes_from_cluster_topology(
    topology: &ClusterTopology,
    leader: Option<&str>,
) -> Vec<ServerNode> {
    let mut tags = topology.members.keys().collect::<Vec<_>>();
    tags.sort_by(|a, b| {
        let a_is_leader = Some(a.as_str()) == leader;
        let b_is_leader = Some(b.as_str()) == leader;
        b_is_leader.cmp(&a_is_leader).then_with(|| a.cmp(b))
    });

    tags.into_iter()
        .map(|tag| {
            ServerNode::new(topology.members[tag].clone(), None)
                .with_cluster_tag(tag)
                .with_server_role(ServerRole::Member)
        })
        .collect()
}
