use serde::Serialize;

/// Broad category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The ticketing source or the store could not be reached or returned an error.
    Upstream,
    /// The request itself was rejected. The message is safe to show to the user.
    Validation,
    /// An email could not be delivered.
    Delivery,
}

/// Failure value returned by every core operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn upstream(message: impl Into<String>) -> Self {
        QueryError {
            kind: ErrorKind::Upstream,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        QueryError {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        QueryError {
            kind: ErrorKind::Delivery,
            message: message.into(),
        }
    }
}

/// Extension for collapsing an `anyhow` failure into an upstream `QueryError`.
///
/// The underlying error is logged, the caller only sees `message`.
pub trait UpstreamContext<T> {
    fn upstream(self, message: &str) -> QueryResult<T>;
}

impl<T> UpstreamContext<T> for anyhow::Result<T> {
    fn upstream(self, message: &str) -> QueryResult<T> {
        self.map_err(|e| {
            log::error!("{}: {:#}", message, e);
            QueryError::upstream(message)
        })
    }
}
