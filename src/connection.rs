use std::backtrace::Backtrace;
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::Options;
use crate::error::{DbSqlError, with_stack};
use crate::hooks::{Context, OperationMetadata, call_open_session_hook, call_operation_metadata_hook};
use crate::remote::{Session, SessionClient, Transport};
use crate::results::{ExecResult, ResultSet};
use crate::statement::PreparedStatement;
use crate::translation::{Template, bind};
use crate::types::{NamedValue, Value, format_timestamp};

/// A driver connection: one transport and at most one cached remote session.
///
/// The session is opened on first use and reused by every later call until
/// [`Connection::reset_session`] or [`Connection::close`]. Mutating calls take
/// `&mut self`, so a connection cannot be shared between concurrent callers.
pub struct Connection {
    transport: Box<dyn Transport>,
    session: Option<Arc<dyn Session>>,
    client: Arc<dyn SessionClient>,
    options: Options,
    // Random; only used to correlate log lines.
    id: u64,
}

// Manual Debug implementation because the remote seams do not expose `Debug`
impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session", &self.session.as_ref().map(|s| s.id().to_string()))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        transport: Box<dyn Transport>,
        client: Arc<dyn SessionClient>,
        options: Options,
    ) -> Self {
        Self {
            transport,
            session: None,
            client,
            options,
            id: rand::random(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Whether a session is currently cached.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn log_op(&self, op: &str) {
        if !self.options.log_output.is_enabled() {
            return;
        }
        tracing::debug!(conn_id = self.id, op, "connection operation");
        // Only captured when a subscriber wants trace output.
        if tracing::enabled!(tracing::Level::TRACE) {
            let stack = Backtrace::force_capture();
            tracing::trace!(conn_id = self.id, op, stack = %stack, "connection operation stack");
        }
    }

    fn log_warn(&self, message: &str, err: Option<&DbSqlError>) {
        if self.options.log_output.is_enabled() {
            match err {
                Some(err) => tracing::warn!(conn_id = self.id, error = %err, "{message}"),
                None => tracing::warn!(conn_id = self.id, "{message}"),
            }
        }
    }

    /// Check the session is alive, opening one first if needed.
    ///
    /// # Errors
    /// Returns the annotated open-session or ping failure.
    pub async fn ping(&mut self, ctx: &Context) -> Result<(), DbSqlError> {
        self.log_op("Ping");

        let session = self.open_session(ctx).await?;
        ctx.run(self.options.timeout_duration(), session.ping(ctx))
            .await
            .map_err(with_stack)
    }

    /// Normalise an argument before it reaches the statement builder.
    ///
    /// Timestamps become text in [`crate::TIMESTAMP_FORMAT`]. Every other
    /// value is declined with `DbSqlError::Skip` so the default conversion
    /// applies.
    ///
    /// # Errors
    /// `DbSqlError::Skip` for anything that is not a timestamp.
    pub fn check_named_value(&self, arg: &mut NamedValue) -> Result<(), DbSqlError> {
        self.log_op("CheckNamedValue");

        if let Value::Timestamp(ts) = &arg.value {
            arg.value = Value::Text(format_timestamp(ts));
            return Ok(());
        }
        Err(DbSqlError::Skip(format!(
            "{} values use the default conversion",
            arg.value.type_name()
        )))
    }

    fn convert_args(&self, args: &[NamedValue]) -> Result<Vec<NamedValue>, DbSqlError> {
        args.iter()
            .cloned()
            .map(|mut arg| match self.check_named_value(&mut arg) {
                Ok(()) => Ok(arg),
                Err(err) if err.is_skip() => default_check_named_value(arg),
                Err(err) => Err(err),
            })
            .collect()
    }

    /// Parse `query` once for repeated execution. No remote call is made.
    pub fn prepare(&mut self, query: &str) -> PreparedStatement<'_> {
        self.log_op("PrepareContext");

        PreparedStatement::new(self, Template::parse(query))
    }

    /// Execute a statement that returns rows.
    ///
    /// # Errors
    /// Annotated session, binding or remote errors.
    pub async fn query(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ResultSet, DbSqlError> {
        self.log_op("QueryContext");

        self.query_template(ctx, &Template::parse(query), args).await
    }

    /// Execute a statement that does not return rows.
    ///
    /// # Errors
    /// Annotated session, binding or remote errors.
    pub async fn exec(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult, DbSqlError> {
        self.log_op("ExecContext");

        self.exec_template(ctx, &Template::parse(query), args).await
    }

    pub(crate) async fn query_template(
        &mut self,
        ctx: &Context,
        template: &Template,
        args: &[NamedValue],
    ) -> Result<ResultSet, DbSqlError> {
        let session = self.open_session(ctx).await?;
        let statement = self.statement(template, args)?;

        let outcome = ctx
            .run(
                self.options.timeout_duration(),
                session.query(ctx, &statement, self.options.max_rows),
            )
            .await
            .map_err(with_stack)?;

        self.notify_operation(ctx, &outcome.metadata);
        Ok(outcome.result_set)
    }

    pub(crate) async fn exec_template(
        &mut self,
        ctx: &Context,
        template: &Template,
        args: &[NamedValue],
    ) -> Result<ExecResult, DbSqlError> {
        let session = self.open_session(ctx).await?;
        let statement = self.statement(template, args)?;

        let metadata = ctx
            .run(
                self.options.timeout_duration(),
                session.exec(ctx, &statement),
            )
            .await
            .map_err(with_stack)?;

        self.notify_operation(ctx, &metadata);
        Ok(ExecResult::new(metadata))
    }

    fn statement(&self, template: &Template, args: &[NamedValue]) -> Result<String, DbSqlError> {
        let args = self.convert_args(args).map_err(with_stack)?;
        bind(template, &args).map_err(with_stack)
    }

    fn notify_operation(&self, ctx: &Context, metadata: &OperationMetadata) {
        if !call_operation_metadata_hook(ctx, metadata) {
            self.log_warn("operation metadata hook panicked", None);
        }
    }

    /// Transactions are not supported.
    ///
    /// # Errors
    /// Always `DbSqlError::Unsupported`.
    pub fn begin(&self) -> Result<Infallible, DbSqlError> {
        Err(not_supported())
    }

    /// Return the cached session, opening one if there is none.
    ///
    /// The context's open-session hook sees the session id either way.
    ///
    /// # Errors
    /// `DbSqlError::BadConnection` wrapping the cause when the session cannot
    /// be opened; cancellation is reported as itself.
    pub async fn open_session(&mut self, ctx: &Context) -> Result<Arc<dyn Session>, DbSqlError> {
        self.log_op("OpenSession");

        let session = match self.session.clone() {
            Some(session) => session,
            None => self.create_session(ctx).await?,
        };

        if !call_open_session_hook(ctx, session.id()) {
            self.log_warn("open session hook panicked", None);
        }
        Ok(session)
    }

    async fn create_session(&mut self, ctx: &Context) -> Result<Arc<dyn Session>, DbSqlError> {
        let session = match ctx
            .run(self.options.timeout_duration(), self.client.open_session(ctx))
            .await
        {
            Ok(session) => session,
            Err(err) if err.is_cancelled() => return Err(with_stack(err)),
            Err(err) => {
                self.log_warn("failed to open session", Some(&err));
                return Err(with_stack(DbSqlError::BadConnection(Box::new(err))));
            }
        };

        self.session = Some(session.clone());
        Ok(session)
    }

    /// Close the cached session, if any.
    ///
    /// The cache is only cleared when the remote close succeeds; after a
    /// failure the old session stays cached and is reused.
    ///
    /// # Errors
    /// The annotated remote close failure.
    pub async fn reset_session(&mut self, ctx: &Context) -> Result<(), DbSqlError> {
        self.log_op("ResetSession");

        if let Some(session) = self.session.clone() {
            ctx.run(self.options.timeout_duration(), session.close(ctx))
                .await
                .map_err(with_stack)?;
            self.session = None;
        }
        Ok(())
    }

    /// Release the transport. A cached session is not closed first; call
    /// [`Connection::reset_session`] for that.
    ///
    /// # Errors
    /// The annotated transport close failure.
    pub fn close(self) -> Result<(), DbSqlError> {
        self.log_op("Close");
        if self.options.log_output.is_enabled() {
            tracing::debug!(conn_id = self.id, "close connection");
        }

        let mut transport = self.transport;
        transport.close().map_err(with_stack)
    }
}

/// The conversion used when [`Connection::check_named_value`] declines a value.
///
/// Every [`Value`] variant is already a driver value, so this accepts it as is.
///
/// # Errors
/// Never fails today; the `Result` leaves room for stricter checks.
pub fn default_check_named_value(arg: NamedValue) -> Result<NamedValue, DbSqlError> {
    Ok(arg)
}

pub(crate) fn not_supported() -> DbSqlError {
    DbSqlError::Unsupported("transactions are not supported".to_string())
}
