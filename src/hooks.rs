//! Per-call context: cancellation, deadline and observer hooks.
//!
//! A [`Context`] is passed to every operation that talks to the remote
//! service. It carries two optional callbacks:
//!
//! - an open-session hook, called with the session id when a session is acquired;
//! - an operation-metadata hook, called after a statement finished executing.
//!
//! ```rust
//! use databricks_sql::prelude::*;
//!
//! let ctx = Context::new()
//!     .with_open_session_hook(|id| println!("session {id}"))
//!     .with_operation_metadata_hook(|m| println!("op {} rows {}", m.operation_id(), m.rows_affected()));
//! # let _ = ctx;
//! ```
//!
//! Deriving a context with a hook shadows the parent's hook of that kind for
//! the derived value only. Cancellation flows from parent to derived context,
//! never back.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DbSqlError;

/// Type alias for the open-session callback.
pub type OpenSessionHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the operation-metadata callback.
pub type OperationMetadataHook = Arc<dyn Fn(&OperationMetadata) + Send + Sync>;

/// What the remote service reported about a finished statement.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetadata {
    operation_id: String,
    has_result_set: bool,
    rows_affected: f64,
}

impl OperationMetadata {
    pub fn new(operation_id: impl Into<String>, has_result_set: bool, rows_affected: f64) -> Self {
        Self {
            operation_id: operation_id.into(),
            has_result_set,
            rows_affected,
        }
    }

    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    #[must_use]
    pub fn has_result_set(&self) -> bool {
        self.has_result_set
    }

    #[must_use]
    pub fn rows_affected(&self) -> f64 {
        self.rows_affected
    }
}

#[derive(Clone)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    on_open_session: Option<OpenSessionHook>,
    on_operation_metadata: Option<OperationMetadataHook>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            on_open_session: None,
            on_operation_metadata: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("on_open_session", &self.on_open_session.is_some())
            .field("on_operation_metadata", &self.on_operation_metadata.is_some())
            .finish()
    }
}

impl Context {
    /// A context with no hooks, no deadline and its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked with the session id whenever a session is
    /// acquired, cached or newly opened.
    ///
    /// The returned context cancels with this one but not the other way round.
    #[must_use]
    pub fn with_open_session_hook(self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        let mut derived = self.child();
        derived.on_open_session = Some(Arc::new(f));
        derived
    }

    /// Register a callback invoked after a statement executes successfully.
    ///
    /// The returned context cancels with this one but not the other way round.
    #[must_use]
    pub fn with_operation_metadata_hook(
        self,
        f: impl Fn(&OperationMetadata) + Send + Sync + 'static,
    ) -> Self {
        let mut derived = self.child();
        derived.on_operation_metadata = Some(Arc::new(f));
        derived
    }

    /// Use `token` for cancellation instead of the context's own.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A derived context whose token is cancelled when this one is.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut child = self.clone();
        child.cancel = self.cancel.child_token();
        child
    }

    /// Set a deadline `timeout` from now. An earlier existing deadline wins.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline. An earlier existing deadline wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it finishes, the token fires, or the deadline passes.
    ///
    /// `fallback` is used as a timeout when the context has no deadline.
    /// A context that is already cancelled never polls `fut`.
    pub(crate) async fn run<T, F>(&self, fallback: Option<Duration>, fut: F) -> Result<T, DbSqlError>
    where
        F: Future<Output = Result<T, DbSqlError>>,
    {
        let deadline = self
            .deadline
            .or_else(|| fallback.map(|timeout| Instant::now() + timeout));

        let bounded = async {
            match deadline {
                Some(at) => tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| DbSqlError::DeadlineExceeded)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DbSqlError::Cancelled),
            res = bounded => res,
        }
    }
}

/// Free-function form of [`Context::with_open_session_hook`].
#[must_use]
pub fn with_open_session_hook(
    ctx: &Context,
    f: impl Fn(&str) + Send + Sync + 'static,
) -> Context {
    ctx.clone().with_open_session_hook(f)
}

/// Free-function form of [`Context::with_operation_metadata_hook`].
#[must_use]
pub fn with_operation_metadata_hook(
    ctx: &Context,
    f: impl Fn(&OperationMetadata) + Send + Sync + 'static,
) -> Context {
    ctx.clone().with_operation_metadata_hook(f)
}

/// Returns `false` if the hook panicked. A missing hook counts as success.
pub(crate) fn call_open_session_hook(ctx: &Context, session_id: &str) -> bool {
    call_context_hook(ctx.on_open_session.as_deref(), session_id)
}

/// Returns `false` if the hook panicked. A missing hook counts as success.
pub(crate) fn call_operation_metadata_hook(ctx: &Context, metadata: &OperationMetadata) -> bool {
    call_context_hook(ctx.on_operation_metadata.as_deref(), metadata)
}

fn call_context_hook<T: ?Sized>(hook: Option<&(dyn Fn(&T) + Send + Sync)>, input: &T) -> bool {
    let Some(hook) = hook else {
        return true;
    };
    catch_unwind(AssertUnwindSafe(|| hook(input))).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn missing_hooks_are_noops() {
        let ctx = Context::new();
        assert!(call_open_session_hook(&ctx, "abc"));
        assert!(call_operation_metadata_hook(
            &ctx,
            &OperationMetadata::new("op", false, 0.0)
        ));
    }

    #[test]
    fn open_session_hook_receives_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = Context::new().with_open_session_hook(move |id| {
            sink.lock().unwrap().push(id.to_string());
        });

        assert!(call_open_session_hook(&ctx, "session-1"));
        assert_eq!(*seen.lock().unwrap(), vec!["session-1".to_string()]);
    }

    #[test]
    fn derived_context_shadows_parent_only() {
        let parent_calls = Arc::new(AtomicUsize::new(0));
        let child_calls = Arc::new(AtomicUsize::new(0));

        let p = parent_calls.clone();
        let parent = Context::new().with_open_session_hook(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let c = child_calls.clone();
        let child = with_open_session_hook(&parent, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        call_open_session_hook(&child, "s");
        call_open_session_hook(&parent, "s");
        assert_eq!(parent_calls.load(Ordering::SeqCst), 1);
        assert_eq!(child_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_hook_is_contained() {
        let ctx = Context::new().with_operation_metadata_hook(|_| panic!("observer bug"));
        let ok = call_operation_metadata_hook(&ctx, &OperationMetadata::new("op", true, 1.0));
        assert!(!ok);
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = Context::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn cancelled_context_does_not_poll() {
        let polled = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new();
        ctx.cancel();

        let p = polled.clone();
        let res: Result<(), DbSqlError> = ctx
            .run(None, async move {
                p.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(DbSqlError::Cancelled)));
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelling_hook_derived_context_spares_parent() {
        let parent = Context::new();
        let session_scoped = with_open_session_hook(&parent, |_| {});
        let metadata_scoped = with_operation_metadata_hook(&parent, |_| {});

        session_scoped.cancel();
        assert!(session_scoped.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!metadata_scoped.is_cancelled());

        parent.cancel();
        assert!(metadata_scoped.is_cancelled());
    }

    #[test]
    fn builder_derived_context_follows_supplied_token() {
        let token = CancellationToken::new();
        let ctx = Context::new()
            .with_cancellation(token.clone())
            .with_operation_metadata_hook(|_| {});

        ctx.cancel();
        assert!(!token.is_cancelled());
        token.cancel();
        let again = Context::new()
            .with_cancellation(token.clone())
            .with_open_session_hook(|_| {});
        assert!(again.is_cancelled());
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_expires() {
        let ctx = Context::new().with_timeout(Duration::from_millis(10));
        let res: Result<(), DbSqlError> = ctx
            .run(None, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(DbSqlError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn fallback_timeout_applies_without_deadline() {
        let ctx = Context::new();
        let res: Result<(), DbSqlError> = ctx
            .run(Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(DbSqlError::DeadlineExceeded)));
    }
}
