use crate::ravendb_error::RavenDbError;

/// Outcome of a single attempt against a single node.
///
/// Retryable failures move the command on to the next node. Fatal failures go straight back to
/// the caller.
#[derive(Debug)]
pub(crate) enum AttemptError {
    Retryable(RavenDbError),
    Fatal(RavenDbError),
}

impl AttemptError {
    pub(crate) fn into_inner(self) -> RavenDbError {
        match self {
            AttemptError::Retryable(e) | AttemptError::Fatal(e) => e,
        }
    }

    pub(crate) fn inner(&self) -> &RavenDbError {
        match self {
            AttemptError::Retryable(e) | AttemptError::Fatal(e) => e,
        }
    }
}

impl From<RavenDbError> for AttemptError {
    fn from(e: RavenDbError) -> Self {
        AttemptError::Fatal(e)
    }
}
