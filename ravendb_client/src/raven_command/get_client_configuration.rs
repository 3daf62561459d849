use reqwest::Method;
use serde::Deserialize;

use crate::{
    node_selector::ReadBalanceBehavior,
    raven_command::{database_url, parse_json, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
};

/// Client settings the server pushes down, `GET /databases/{database}/configuration/client`.
#[derive(Debug, Clone)]
pub struct GetClientConfigurationCommand {
    pub database: String,
}

impl GetClientConfigurationCommand {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientConfigurationResult {
    pub etag: i64,
    pub configuration: Option<ClientConfiguration>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientConfiguration {
    pub disabled: bool,
    pub read_balance_behavior: Option<ReadBalanceBehavior>,
    pub max_number_of_requests_per_session: Option<i32>,
}

impl RavenCommand for GetClientConfigurationCommand {
    type Output = ClientConfigurationResult;

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        Ok(CommandRequest::new(
            Method::GET,
            database_url(node, &self.database, &["configuration", "client"])?,
        ))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<ClientConfigurationResult, RavenDbError> {
        parse_json(body)
    }
}
