use reqwest::Method;
use serde::Deserialize;

use crate::{
    raven_command::{database_url, parse_json, CommandRequest, RavenCommand},
    ravendb_error::RavenDbError,
    server_node::ServerNode,
};

/// Loads documents by id, or pages through all documents of a database.
///
/// Responses are cacheable. A missing document is `Ok(None)`, not an error.
#[derive(Debug, Clone)]
pub struct GetDocumentsCommand {
    pub database: String,
    pub ids: Vec<String>,
    pub start: Option<i64>,
    pub page_size: Option<i64>,
    pub metadata_only: bool,
}

impl GetDocumentsCommand {
    pub fn by_id(database: &str, id: &str) -> Self {
        Self::by_ids(database, &[id])
    }

    pub fn by_ids<T: AsRef<str>>(database: &str, ids: &[T]) -> Self {
        Self {
            database: database.to_string(),
            ids: ids.iter().map(|id| id.as_ref().to_string()).collect(),
            start: None,
            page_size: None,
            metadata_only: false,
        }
    }

    pub fn paged(database: &str, start: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            database: database.to_string(),
            ids: Vec::new(),
            start,
            page_size,
            metadata_only: false,
        }
    }

    pub fn metadata_only(mut self) -> Self {
        self.metadata_only = true;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetDocumentsResult {
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub includes: serde_json::Map<String, serde_json::Value>,
}

impl RavenCommand for GetDocumentsCommand {
    type Output = Option<GetDocumentsResult>;

    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError> {
        let mut url = database_url(node, &self.database, &["docs"])?;

        // Collect the optional parts of the query string
        let mut query_string_parts = Vec::new();
        if let Some(start) = self.start {
            query_string_parts.push(("start", start.to_string()));
        }
        if let Some(page_size) = self.page_size {
            query_string_parts.push(("pageSize", page_size.to_string()));
        }
        if self.metadata_only {
            query_string_parts.push(("metadataOnly", "true".to_string()));
        }
        for id in &self.ids {
            query_string_parts.push(("id", id.clone()));
        }

        if !query_string_parts.is_empty() {
            url.query_pairs_mut().extend_pairs(query_string_parts);
        }

        Ok(CommandRequest::new(Method::GET, url))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn can_cache(&self) -> bool {
        true
    }

    fn accepts_not_found(&self) -> bool {
        true
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Option<GetDocumentsResult>, RavenDbError> {
        match body {
            None => Ok(None),
            Some(_) => parse_json(body).map(Some),
        }
    }
}
