use reqwest::Method;

use crate::{
    cluster_topology::ClusterTopologyInfo,
    raven_command::{node_url, parse_json, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
};

/// `GET /cluster/topology`
#[derive(Debug, Clone, Default)]
pub struct GetClusterTopologyCommand;

impl RavenCommand for GetClusterTopologyCommand {
    type Output = ClusterTopologyInfo;

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        Ok(CommandRequest::new(
            Method::GET,
            node_url(node, &["cluster", "topology"])?,
        ))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<ClusterTopologyInfo, RavenDbError> {
        parse_json(body)
    }
}
