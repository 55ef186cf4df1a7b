//! Scripted in-memory stand-ins for the remote seams.
//!
//! Every mock handed out by one [`MockRemote`] shares a [`MockState`], so a
//! test can flip failure switches and read call counters after the fact.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::Options;
use crate::connection::Connection;
use crate::driver::Connector;
use crate::error::DbSqlError;
use crate::hooks::{Context, OperationMetadata};
use crate::remote::{QueryOutcome, Session, SessionClient, Transport};
use crate::results::ResultSet;

/// Counters and failure switches shared by every mock of one remote.
#[derive(Debug, Default)]
pub struct MockState {
    pub connects: AtomicUsize,
    pub opens: AtomicUsize,
    pub pings: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub transport_closes: AtomicUsize,
    pub operations: AtomicUsize,
    pub last_max_rows: AtomicI64,
    pub fail_connect: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_ping: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_execute: AtomicBool,
    pub fail_transport_close: AtomicBool,
    /// Make ping, query and exec wait forever.
    pub hang: AtomicBool,
    statements: Mutex<Vec<String>>,
    next_result: Mutex<Option<ResultSet>>,
    rows_affected: Mutex<f64>,
}

impl MockState {
    fn fail(&self, switch: &AtomicBool, what: &str) -> Result<(), DbSqlError> {
        if switch.load(Ordering::SeqCst) {
            return Err(DbSqlError::remote(format!("mock {what} failure")));
        }
        Ok(())
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn next_operation_id(&self) -> String {
        format!("op-{}", self.operations.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record(&self, statement: &str) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.to_string());
    }
}

/// Entry point for tests: builds connections and connectors over one state.
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    pub state: Arc<MockState>,
}

impl MockRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection wired straight to the mocks, bypassing the driver.
    #[must_use]
    pub fn connection(&self, options: Options) -> Connection {
        Connection::new(
            Box::new(MockTransport {
                state: self.state.clone(),
            }),
            Arc::new(MockClient {
                state: self.state.clone(),
            }),
            options,
        )
    }

    #[must_use]
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            state: self.state.clone(),
        }
    }

    /// Rows returned by the next query; later queries get an empty set.
    pub fn set_next_result(&self, result_set: ResultSet) {
        *self
            .state
            .next_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result_set);
    }

    pub fn set_rows_affected(&self, rows: f64) {
        *self
            .state
            .rows_affected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = rows;
    }

    /// Every bound statement the sessions received, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state
            .statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug)]
pub struct MockConnector {
    state: Arc<MockState>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _options: &Options,
    ) -> Result<(Box<dyn Transport>, Arc<dyn SessionClient>), DbSqlError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.fail(&self.state.fail_connect, "connect")?;

        let transport: Box<dyn Transport> = Box::new(MockTransport {
            state: self.state.clone(),
        });
        let client: Arc<dyn SessionClient> = Arc::new(MockClient {
            state: self.state.clone(),
        });
        Ok((transport, client))
    }
}

#[derive(Debug)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl Transport for MockTransport {
    fn close(&mut self) -> Result<(), DbSqlError> {
        self.state.transport_closes.fetch_add(1, Ordering::SeqCst);
        self.state
            .fail(&self.state.fail_transport_close, "transport close")
    }
}

#[derive(Debug)]
pub struct MockClient {
    state: Arc<MockState>,
}

#[async_trait]
impl SessionClient for MockClient {
    async fn open_session(&self, _ctx: &Context) -> Result<Arc<dyn Session>, DbSqlError> {
        self.state.fail(&self.state.fail_open, "open session")?;
        let n = self.state.opens.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(Arc::new(MockSession {
            id: format!("session-{n}"),
            state: self.state.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct MockSession {
    id: String,
    state: Arc<MockState>,
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn ping(&self, _ctx: &Context) -> Result<(), DbSqlError> {
        self.state.maybe_hang().await;
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        self.state.fail(&self.state.fail_ping, "ping")
    }

    async fn close(&self, _ctx: &Context) -> Result<(), DbSqlError> {
        self.state.session_closes.fetch_add(1, Ordering::SeqCst);
        self.state.fail(&self.state.fail_close, "close session")
    }

    async fn query(
        &self,
        _ctx: &Context,
        statement: &str,
        max_rows: i64,
    ) -> Result<QueryOutcome, DbSqlError> {
        self.state.maybe_hang().await;
        self.state.fail(&self.state.fail_execute, "query")?;
        self.state.record(statement);
        self.state.last_max_rows.store(max_rows, Ordering::SeqCst);

        let result_set = self
            .state
            .next_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        let rows = result_set.len() as f64;

        Ok(QueryOutcome {
            metadata: OperationMetadata::new(self.state.next_operation_id(), true, rows),
            result_set,
        })
    }

    async fn exec(&self, _ctx: &Context, statement: &str) -> Result<OperationMetadata, DbSqlError> {
        self.state.maybe_hang().await;
        self.state.fail(&self.state.fail_execute, "exec")?;
        self.state.record(statement);

        let rows = *self
            .state
            .rows_affected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(OperationMetadata::new(
            self.state.next_operation_id(),
            false,
            rows,
        ))
    }
}
