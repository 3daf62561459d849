use std::time::Duration;

use reqwest::Method;
use uuid::Uuid;

use crate::{
    raven_command::{node_url, parse_json, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
    topology::Topology,
};

/// Downloads the nodes serving a database, `GET /topology?name={database}`.
#[derive(Debug, Clone)]
pub struct GetDatabaseTopologyCommand {
    pub database: String,
    pub application_identifier: Option<Uuid>,
    pub timeout: Option<Duration>,
}

impl GetDatabaseTopologyCommand {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            application_identifier: None,
            timeout: None,
        }
    }

    pub fn with_application_identifier(mut self, application_identifier: Uuid) -> Self {
        self.application_identifier = Some(application_identifier);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl RavenCommand for GetDatabaseTopologyCommand {
    type Output = Topology;

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        let mut url = node_url(node, &["topology"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", &self.database);
            if let Some(application_identifier) = self.application_identifier {
                query.append_pair("applicationIdentifier", &application_identifier.to_string());
            }
        }
        Ok(CommandRequest::new(Method::GET, url))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Topology, RavenDbError> {
        parse_json(body)
    }
}
