//! Request-level error taxonomy.

use crate::forecast::UpstreamError;
use crate::region::{QueryError, TableError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or malformed client input.
    #[error("{0}")]
    Validation(String),
    /// The region name matched nothing.
    #[error("no region matches '{0}'")]
    NotFound(String),
    /// The reference table could not be loaded.
    #[error("region table unavailable: {0}")]
    TableUnavailable(#[from] TableError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QueryError> for GatewayError {
    fn from(e: QueryError) -> Self {
        Self::Validation(e.to_string())
    }
}
