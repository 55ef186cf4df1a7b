use crate::connection::Connection;
use crate::error::DbSqlError;
use crate::hooks::Context;
use crate::results::{ExecResult, ResultSet};
use crate::translation::Template;
use crate::types::NamedValue;

/// A statement parsed once and bound afresh on every execution.
///
/// Preparing is purely local; the remote service only ever sees the fully
/// bound SQL text. The statement borrows its connection mutably, so the
/// connection cannot be used for anything else while it is alive.
pub struct PreparedStatement<'c> {
    conn: &'c mut Connection,
    template: Template,
}

impl<'c> PreparedStatement<'c> {
    pub(crate) fn new(conn: &'c mut Connection, template: Template) -> Self {
        Self { conn, template }
    }

    /// Number of arguments an execution expects.
    ///
    /// Positional placeholders count once each; a named placeholder counts
    /// once however often it appears.
    #[must_use]
    pub fn num_input(&self) -> usize {
        self.template.num_input()
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// # Errors
    /// See [`Connection::query`].
    pub async fn query(
        &mut self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> Result<ResultSet, DbSqlError> {
        self.conn.query_template(ctx, &self.template, args).await
    }

    /// # Errors
    /// See [`Connection::exec`].
    pub async fn exec(
        &mut self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> Result<ExecResult, DbSqlError> {
        self.conn.exec_template(ctx, &self.template, args).await
    }

    /// Release the statement. Nothing is held remotely, so this cannot fail.
    ///
    /// # Errors
    /// Never.
    pub fn close(self) -> Result<(), DbSqlError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::test_utils::MockRemote;
    use crate::types::{Value, positional_args};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn prepare_makes_no_remote_call() {
        let remote = MockRemote::new();
        let mut conn = remote.connection(Options::default());

        let stmt = conn.prepare("SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(stmt.num_input(), 2);
        stmt.close().unwrap();

        assert_eq!(remote.state.opens.load(Ordering::SeqCst), 0);
        assert!(remote.statements().is_empty());
    }

    #[tokio::test]
    async fn named_placeholders_count_once() {
        let remote = MockRemote::new();
        let mut conn = remote.connection(Options::default());

        let stmt = conn.prepare("SELECT :a, :b, :a");
        assert_eq!(stmt.num_input(), 2);
    }

    #[tokio::test]
    async fn executes_repeatedly_with_fresh_arguments() {
        let remote = MockRemote::new();
        let mut conn = remote.connection(Options::default());
        let ctx = Context::new();

        let mut stmt = conn.prepare("INSERT INTO t VALUES (?, ?)");
        stmt.exec(&ctx, &positional_args(vec![Value::Int(1), "a".into()]))
            .await
            .unwrap();
        stmt.exec(&ctx, &positional_args(vec![Value::Int(2), Value::Null]))
            .await
            .unwrap();
        stmt.query(&ctx, &positional_args(vec![Value::Int(3), true.into()]))
            .await
            .unwrap();
        stmt.close().unwrap();

        assert_eq!(
            remote.statements(),
            vec![
                "INSERT INTO t VALUES (1, 'a')".to_string(),
                "INSERT INTO t VALUES (2, NULL)".to_string(),
                "INSERT INTO t VALUES (3, TRUE)".to_string(),
            ]
        );
        assert_eq!(remote.state.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_argument_count_fails_locally() {
        let remote = MockRemote::new();
        let mut conn = remote.connection(Options::default());

        let mut stmt = conn.prepare("SELECT ?");
        let err = stmt.query(&Context::new(), &[]).await.unwrap_err();
        assert!(matches!(err.kind(), DbSqlError::BindingError(_)));
        assert!(remote.statements().is_empty());
    }
}
