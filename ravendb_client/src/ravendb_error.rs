use std::time::Duration;

use crate::{error_chain_fmt, exception_dispatcher::ErrorEnvelope};

#[derive(thiserror::Error)]
pub enum RavenDbError {
    /// Every node of the topology was tried and none could serve the request.
    #[error("{message}")]
    AllTopologyNodesDown {
        message: String,
        #[source]
        last_error: Option<Box<RavenDbError>>,
    },
    #[error("Database `{0}` does not exist")]
    DatabaseDoesNotExist(String),
    #[error("{message}")]
    Concurrency { message: String },
    #[error("{message}")]
    DocumentConflict {
        message: String,
        envelope: ErrorEnvelope,
    },
    #[error("{message}")]
    Timeout { message: String },
    /// A typed error reported by the server through its error envelope.
    #[error("{kind}: {message}")]
    Server {
        kind: ServerErrorKind,
        status: u16,
        message: String,
        error: Option<String>,
    },
    #[error(
        "Server responded with status {status} and a body that is not an error envelope: {body}"
    )]
    MalformedErrorResponse {
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to reach `{url}`")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to `{url}` timed out after {timeout:?}")]
    RequestTimeout { url: String, timeout: Duration },
    #[error("`{url}` is unavailable (status {status})")]
    NodeUnavailable { url: String, status: u16 },
    #[error("{0}")]
    InvalidOperation(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for RavenDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl RavenDbError {
    /// Name of the error kind, following the server's exception naming.
    pub fn kind_name(&self) -> &str {
        match self {
            RavenDbError::AllTopologyNodesDown { .. } => "AllTopologyNodesDownException",
            RavenDbError::DatabaseDoesNotExist(_) => "DatabaseDoesNotExistException",
            RavenDbError::Concurrency { .. } => "ConcurrencyException",
            RavenDbError::DocumentConflict { .. } => "DocumentConflictException",
            RavenDbError::Timeout { .. } | RavenDbError::RequestTimeout { .. } => {
                "TimeoutException"
            }
            RavenDbError::Server { kind, .. } => kind.name(),
            RavenDbError::InvalidOperation(_) => "InvalidOperationException",
            RavenDbError::MalformedErrorResponse { .. }
            | RavenDbError::Transport { .. }
            | RavenDbError::NodeUnavailable { .. }
            | RavenDbError::InvalidResponse(_)
            | RavenDbError::InvalidTopology(_)
            | RavenDbError::UnexpectedError(_) => "RavenException",
        }
    }
}

/// Server exception kinds the client knows by name.
///
/// Anything else the server reports is kept verbatim in [`ServerErrorKind::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    AuthorizationException,
    BadRequestException,
    BulkInsertAbortedException,
    ClientVersionMismatchException,
    CompareExchangeKeyTooBigException,
    DatabaseDisabledException,
    DatabaseDoesNotExistException,
    DatabaseLoadFailureException,
    DatabaseLoadTimeoutException,
    DatabaseNotRelevantException,
    DocumentDoesNotExistException,
    IndexCompilationException,
    IndexDoesNotExistException,
    InvalidQueryException,
    NoLeaderException,
    NodeIsPassiveException,
    RavenException,
    SubscriptionDoesNotExistException,
    SubscriptionInUseException,
    Other(String),
}

impl ServerErrorKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "AuthorizationException" => Self::AuthorizationException,
            "BadRequestException" => Self::BadRequestException,
            "BulkInsertAbortedException" => Self::BulkInsertAbortedException,
            "ClientVersionMismatchException" => Self::ClientVersionMismatchException,
            "CompareExchangeKeyTooBigException" => Self::CompareExchangeKeyTooBigException,
            "DatabaseDisabledException" => Self::DatabaseDisabledException,
            "DatabaseDoesNotExistException" => Self::DatabaseDoesNotExistException,
            "DatabaseLoadFailureException" => Self::DatabaseLoadFailureException,
            "DatabaseLoadTimeoutException" => Self::DatabaseLoadTimeoutException,
            "DatabaseNotRelevantException" => Self::DatabaseNotRelevantException,
            "DocumentDoesNotExistException" => Self::DocumentDoesNotExistException,
            "IndexCompilationException" => Self::IndexCompilationException,
            "IndexDoesNotExistException" => Self::IndexDoesNotExistException,
            "InvalidQueryException" => Self::InvalidQueryException,
            "NoLeaderException" => Self::NoLeaderException,
            "NodeIsPassiveException" => Self::NodeIsPassiveException,
            "RavenException" => Self::RavenException,
            "SubscriptionDoesNotExistException" => Self::SubscriptionDoesNotExistException,
            "SubscriptionInUseException" => Self::SubscriptionInUseException,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AuthorizationException => "AuthorizationException",
            Self::BadRequestException => "BadRequestException",
            Self::BulkInsertAbortedException => "BulkInsertAbortedException",
            Self::ClientVersionMismatchException => "ClientVersionMismatchException",
            Self::CompareExchangeKeyTooBigException => "CompareExchangeKeyTooBigException",
            Self::DatabaseDisabledException => "DatabaseDisabledException",
            Self::DatabaseDoesNotExistException => "DatabaseDoesNotExistException",
            Self::DatabaseLoadFailureException => "DatabaseLoadFailureException",
            Self::DatabaseLoadTimeoutException => "DatabaseLoadTimeoutException",
            Self::DatabaseNotRelevantException => "DatabaseNotRelevantException",
            Self::DocumentDoesNotExistException => "DocumentDoesNotExistException",
            Self::IndexCompilationException => "IndexCompilationException",
            Self::IndexDoesNotExistException => "IndexDoesNotExistException",
            Self::InvalidQueryException => "InvalidQueryException",
            Self::NoLeaderException => "NoLeaderException",
            Self::NodeIsPassiveException => "NodeIsPassiveException",
            Self::RavenException => "RavenException",
            Self::SubscriptionDoesNotExistException => "SubscriptionDoesNotExistException",
            Self::SubscriptionInUseException => "SubscriptionInUseException",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
