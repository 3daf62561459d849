//! Turns unsuccessful responses into [`RavenDbError`]s.
//!
//! The server reports failures as a JSON envelope naming the .NET exception it raised. Known
//! namespaces are stripped down to the leaf exception name, which then selects the error kind.
use serde::Deserialize;

use crate::ravendb_error::{RavenDbError, ServerErrorKind};

const CLIENT_EXCEPTIONS_NAMESPACE: &str = "Raven.Client.Exceptions.";
const SERVER_EXCEPTIONS_NAMESPACE: &str = "Raven.Server.";
const PLATFORM_TIMEOUT_EXCEPTION: &str = "System.TimeoutException";

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub url: Option<String>,
    pub r#type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Builds the error for a response with `status` and raw `body`.
///
/// A body that is not an error envelope becomes [`RavenDbError::MalformedErrorResponse`], except
/// for `409` where the status alone is enough to report a concurrency failure.
pub fn throw(status: u16, body: &[u8]) -> RavenDbError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => get(status, Some(envelope)),
        Err(_) if status == 409 => get(status, None),
        Err(source) => RavenDbError::MalformedErrorResponse {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
            source,
        },
    }
}

/// Maps a status and an optional envelope to exactly one error.
pub fn get(status: u16, envelope: Option<ErrorEnvelope>) -> RavenDbError {
    if status == 409 {
        return conflict(envelope);
    }

    let envelope = match envelope {
        Some(envelope) => envelope,
        None => {
            return RavenDbError::Server {
                kind: ServerErrorKind::RavenException,
                status,
                message: format!("Server responded with status {}", status),
                error: None,
            }
        }
    };

    if envelope.r#type == PLATFORM_TIMEOUT_EXCEPTION {
        return RavenDbError::Timeout {
            message: envelope.message,
        };
    }

    let kind = match exception_name(&envelope.r#type) {
        Some("DatabaseDoesNotExistException") => {
            return RavenDbError::DatabaseDoesNotExist(envelope.message)
        }
        Some("ConcurrencyException") => {
            return RavenDbError::Concurrency {
                message: envelope.message,
            }
        }
        Some("TimeoutException") => {
            return RavenDbError::Timeout {
                message: envelope.message,
            }
        }
        Some(name) => ServerErrorKind::from_name(name),
        None => ServerErrorKind::RavenException,
    };

    RavenDbError::Server {
        kind,
        status,
        message: envelope.message,
        error: envelope.error,
    }
}

fn conflict(envelope: Option<ErrorEnvelope>) -> RavenDbError {
    match envelope {
        Some(envelope) if envelope.r#type.contains("DocumentConflictException") => {
            RavenDbError::DocumentConflict {
                message: envelope.message.clone(),
                envelope,
            }
        }
        Some(envelope) => RavenDbError::Concurrency {
            message: envelope.message,
        },
        None => RavenDbError::Concurrency {
            message: "Server responded with 409 Conflict".to_string(),
        },
    }
}

/// Leaf exception name for a fully qualified type from a known namespace.
fn exception_name(type_name: &str) -> Option<&str> {
    let rest = type_name
        .strip_prefix(CLIENT_EXCEPTIONS_NAMESPACE)
        .or_else(|| type_name.strip_prefix(SERVER_EXCEPTIONS_NAMESPACE))?;
    rest.rsplit('.').next().filter(|name| !name.is_empty())
}
