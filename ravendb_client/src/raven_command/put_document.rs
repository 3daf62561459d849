use reqwest::{
    header::{HeaderValue, IF_MATCH},
    Method,
};
use serde::Deserialize;

use crate::{
    header_utils::quote_change_vector,
    raven_command::{database_url, parse_json, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
};

/// Stores a document, `PUT /databases/{database}/docs?id={id}`.
///
/// With an expected change vector the server rejects the write with `409` if the stored
/// document has moved on.
#[derive(Debug, Clone)]
pub struct PutDocumentCommand {
    pub database: String,
    pub id: String,
    pub change_vector: Option<String>,
    pub document: serde_json::Value,
}

impl PutDocumentCommand {
    pub fn new(database: &str, id: &str, document: serde_json::Value) -> Self {
        Self {
            database: database.to_string(),
            id: id.to_string(),
            change_vector: None,
            document,
        }
    }

    pub fn with_change_vector(mut self, change_vector: &str) -> Self {
        self.change_vector = Some(change_vector.to_string());
        self
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PutResult {
    pub id: String,
    pub change_vector: String,
}

impl RavenCommand for PutDocumentCommand {
    type Output = PutResult;

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        let mut url = database_url(node, &self.database, &["docs"])?;
        url.query_pairs_mut().append_pair("id", &self.id);

        let mut request = CommandRequest::new(Method::PUT, url).with_json_body(&self.document)?;
        if let Some(change_vector) = &self.change_vector {
            let value = HeaderValue::from_str(&quote_change_vector(change_vector))
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Invalid change vector `{}`. Caused by: {}",
                        change_vector,
                        e
                    )
                })?;
            request.headers.insert(IF_MATCH, value);
        }
        Ok(request)
    }

    fn is_read_request(&self) -> bool {
        false
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<PutResult, RavenDbError> {
        parse_json(body)
    }
}
