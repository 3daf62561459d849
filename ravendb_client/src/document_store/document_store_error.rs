use crate::{error_chain_fmt, ravendb_error::RavenDbError};

#[derive(thiserror::Error)]
pub enum DocumentStoreError {
    #[error("No URLs were supplied and a document store can't exist without at least one")]
    MissingUrlsError,
    #[error("Invalid url `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Urls must all use the same scheme, found `{0}`")]
    MixedSchemes(String),
    #[error("A client certificate requires https, found `{0}`")]
    HttpsRequired(String),
    #[error("No database was given and the document store has no default database")]
    MissingDatabase,
    #[error("The document store has been closed")]
    Closed,
    #[error(transparent)]
    RavenDb(#[from] RavenDbError),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
