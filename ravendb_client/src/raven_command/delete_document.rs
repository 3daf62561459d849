use reqwest::{
    header::{HeaderValue, IF_MATCH},
    Method,
};

use crate::{
    header_utils::quote_change_vector,
    raven_command::{database_url, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
};

/// `DELETE /databases/{database}/docs?id={id}`
#[derive(Debug, Clone)]
pub struct DeleteDocumentCommand {
    pub database: String,
    pub id: String,
    pub change_vector: Option<String>,
}

impl DeleteDocumentCommand {
    pub fn new(database: &str, id: &str) -> Self {
        Self {
            database: database.to_string(),
            id: id.to_string(),
            change_vector: None,
        }
    }

    pub fn with_change_vector(mut self, change_vector: &str) -> Self {
        self.change_vector = Some(change_vector.to_string());
        self
    }
}

impl RavenCommand for DeleteDocumentCommand {
    type Output = ();

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        let mut url = database_url(node, &self.database, &["docs"])?;
        url.query_pairs_mut().append_pair("id", &self.id);

        let mut request = CommandRequest::new(Method::DELETE, url);
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

    fn parse_response(&self, _body: Option<&[u8]>, _from_cache: bool) -> Result<(), RavenDbError> {
        Ok(())
    }
}
