//! Seams to the remote query service.
//!
//! The transport, the wire protocol and row decoding live behind these
//! traits; the connection only needs to open, ping and close sessions and to
//! hand a bound SQL string to a session.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DbSqlError;
use crate::hooks::{Context, OperationMetadata};
use crate::results::ResultSet;

/// The byte transport a connection owns for its whole life.
pub trait Transport: Send {
    /// Release the transport. Called exactly once, by `Connection::close`.
    ///
    /// # Errors
    /// Returns the transport's own failure, wrapped as `DbSqlError::Remote`.
    fn close(&mut self) -> Result<(), DbSqlError>;
}

/// Factory for remote sessions.
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn open_session(&self, ctx: &Context) -> Result<Arc<dyn Session>, DbSqlError>;
}

/// An open session on the remote service.
#[async_trait]
pub trait Session: Send + Sync {
    /// The identifier the service assigned to this session.
    fn id(&self) -> &str;

    async fn ping(&self, ctx: &Context) -> Result<(), DbSqlError>;

    async fn close(&self, ctx: &Context) -> Result<(), DbSqlError>;

    /// Execute a statement that returns rows, fetching at most `max_rows`.
    async fn query(
        &self,
        ctx: &Context,
        statement: &str,
        max_rows: i64,
    ) -> Result<QueryOutcome, DbSqlError>;

    /// Execute a statement that does not return rows.
    async fn exec(&self, ctx: &Context, statement: &str) -> Result<OperationMetadata, DbSqlError>;
}

/// Rows plus the status of the operation that produced them.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub metadata: OperationMetadata,
    pub result_set: ResultSet,
}
