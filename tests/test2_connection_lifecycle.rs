//! Session caching, reset and close through the public driver surface.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use databricks_sql::prelude::*;
use databricks_sql::test_utils::MockRemote;
use tokio::runtime::Runtime;

const URI: &str = "databricks://token:t@host.example.com/sql/1.0/warehouses/w?timeout=30";

#[test]
fn full_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let remote = MockRemote::new();
        let driver = Driver::new(remote.connector());
        let mut conn = driver.open(URI).await?;
        let ctx = Context::new();

        // Several operations share one session.
        conn.ping(&ctx).await?;
        conn.exec(&ctx, "CREATE TABLE t (a INT)", &[]).await?;
        conn.query(&ctx, "SELECT a FROM t", &[]).await?;
        assert_eq!(remote.state.opens.load(Ordering::SeqCst), 1);

        // A reset forces the next operation onto a new session.
        conn.reset_session(&ctx).await?;
        conn.ping(&ctx).await?;
        assert_eq!(remote.state.opens.load(Ordering::SeqCst), 2);
        assert_eq!(remote.state.session_closes.load(Ordering::SeqCst), 1);

        conn.close()?;
        assert_eq!(remote.state.transport_closes.load(Ordering::SeqCst), 1);
        Ok::<_, DbSqlError>(())
    })?;
    Ok(())
}

#[tokio::test]
async fn each_connection_has_its_own_session() -> Result<(), DbSqlError> {
    let remote = MockRemote::new();
    let driver = Driver::new(remote.connector());
    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = ids.clone();
    let ctx = Context::new().with_open_session_hook(move |id| sink.lock().unwrap().push(id.to_string()));

    let mut a = driver.open(URI).await?;
    let mut b = driver.open(URI).await?;
    a.ping(&ctx).await?;
    b.ping(&ctx).await?;
    a.ping(&ctx).await?;

    // Reused sessions are reported too, so `a` shows up twice.
    let ids = ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 3);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[0], ids[2]);
    Ok(())
}

#[tokio::test]
async fn bad_connection_carries_cause_and_stack() {
    let remote = MockRemote::new();
    remote.state.fail_open.store(true, Ordering::SeqCst);
    let mut conn = remote.connection(Options::default());

    let err = conn.ping(&Context::new()).await.unwrap_err();
    assert!(err.is_bad_connection());
    assert!(err.stack().is_some());
    assert!(err.to_string().contains("mock open session failure"));
    assert_eq!(remote.state.pings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transport_close_failure_is_reported() {
    let remote = MockRemote::new();
    remote.state.fail_transport_close.store(true, Ordering::SeqCst);
    let conn = remote.connection(Options::default());

    let err = conn.close().unwrap_err();
    assert!(err.has_stack());
    assert_eq!(remote.state.transport_closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tracing_output_does_not_change_behaviour() -> Result<(), DbSqlError> {
    let remote = MockRemote::new();
    let opts = Options::default().with_log_output(LogOutput::Tracing);
    let mut conn = remote.connection(opts);

    conn.ping(&Context::new()).await?;
    conn.reset_session(&Context::new()).await?;
    conn.close()
}

#[tokio::test]
async fn cancelling_a_parent_context_cancels_children() {
    let remote = MockRemote::new();
    let mut conn = remote.connection(Options::default());
    let parent = Context::new();
    let child = parent.child();
    parent.cancel();

    let err = conn.ping(&child).await.unwrap_err();
    assert!(matches!(err.kind(), DbSqlError::Cancelled));
    assert!(!conn.has_session());
}
