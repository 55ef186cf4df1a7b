use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a remote collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DbSqlError {
    #[error("invalid connection URI: {0}")]
    ParseError(String),

    /// The session could not be opened; the whole connection should be discarded.
    #[error("driver: bad connection: {0}")]
    BadConnection(#[source] Box<DbSqlError>),

    #[error("parameter binding error: {0}")]
    BindingError(String),

    /// The value is not handled here and should go through the default conversion.
    #[error("driver: skip fast-path; continue as if unimplemented: {0}")]
    Skip(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Remote(#[source] BoxError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{source}")]
    WithStack {
        #[source]
        source: Box<DbSqlError>,
        stack: StackTrace,
    },
}

/// A call stack captured once, at the point an error was first annotated.
///
/// Clones share the same capture, so two handles to one trace compare equal
/// with [`StackTrace::same_capture`].
#[derive(Clone)]
pub struct StackTrace(Arc<Backtrace>);

impl StackTrace {
    fn capture() -> Self {
        StackTrace(Arc::new(Backtrace::force_capture()))
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.0
    }

    #[must_use]
    pub fn same_capture(&self, other: &StackTrace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Adds a stack trace if one is not already present.
#[must_use]
pub fn with_stack(err: DbSqlError) -> DbSqlError {
    if err.has_stack() {
        return err;
    }
    DbSqlError::WithStack {
        source: Box::new(err),
        stack: StackTrace::capture(),
    }
}

impl DbSqlError {
    /// Wrap any remote failure.
    pub fn remote<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        DbSqlError::Remote(err.into())
    }

    #[must_use]
    pub fn with_stack(self) -> Self {
        with_stack(self)
    }

    /// Whether this error, or its bad-connection cause, already carries a trace.
    #[must_use]
    pub fn has_stack(&self) -> bool {
        self.stack().is_some()
    }

    #[must_use]
    pub fn stack(&self) -> Option<&StackTrace> {
        match self {
            DbSqlError::WithStack { stack, .. } => Some(stack),
            DbSqlError::BadConnection(cause) => cause.stack(),
            _ => None,
        }
    }

    /// The error with any stack annotation peeled off.
    #[must_use]
    pub fn kind(&self) -> &DbSqlError {
        match self {
            DbSqlError::WithStack { source, .. } => source.kind(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_bad_connection(&self) -> bool {
        matches!(self.kind(), DbSqlError::BadConnection(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.kind(),
            DbSqlError::Cancelled | DbSqlError::DeadlineExceeded
        )
    }

    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self.kind(), DbSqlError::Skip(_))
    }
}
