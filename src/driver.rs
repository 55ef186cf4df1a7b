use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Options, parse_uri};
use crate::connection::Connection;
use crate::error::{DbSqlError, with_stack};
use crate::hooks::Context;
use crate::remote::{SessionClient, Transport};

/// The name the driver registers under; also the URI scheme it accepts.
pub const DRIVER_NAME: &str = "databricks";

/// Builds the transport and RPC client for a set of options.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        options: &Options,
    ) -> Result<(Box<dyn Transport>, Arc<dyn SessionClient>), DbSqlError>;
}

/// Opens connections from URIs. Cloning shares the connector.
#[derive(Clone)]
pub struct Driver {
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Parse `uri` and connect. No session is opened yet.
    ///
    /// # Errors
    /// The annotated `DbSqlError::ParseError` for a bad URI, otherwise the
    /// annotated connector failure.
    pub async fn open(&self, uri: &str) -> Result<Connection, DbSqlError> {
        let options = parse_uri(uri).map_err(with_stack)?;
        self.open_with_options(options).await
    }

    /// Connect with already parsed options, bounded by `options.timeout`.
    ///
    /// # Errors
    /// The annotated connector failure, or `DeadlineExceeded`.
    pub async fn open_with_options(&self, options: Options) -> Result<Connection, DbSqlError> {
        let (transport, client) = Context::new()
            .run(options.timeout_duration(), self.connector.connect(&options))
            .await
            .map_err(with_stack)?;

        let conn = Connection::new(transport, client, options);
        if conn.options().log_output.is_enabled() {
            tracing::debug!(conn_id = conn.id(), host = %conn.options().host, "open connection");
        }
        Ok(conn)
    }
}

/// Named drivers, looked up by the name given at registration.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Driver>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `driver` under [`DRIVER_NAME`].
    #[must_use]
    pub fn with_default(driver: Driver) -> Self {
        let mut registry = Self::new();
        registry.drivers.insert(DRIVER_NAME.to_string(), driver);
        registry
    }

    /// # Errors
    /// `DbSqlError::ConfigError` if the name is empty or already taken.
    pub fn register(&mut self, name: &str, driver: Driver) -> Result<(), DbSqlError> {
        if name.is_empty() {
            return Err(DbSqlError::ConfigError(
                "driver name must not be empty".to_string(),
            ));
        }
        if self.drivers.contains_key(name) {
            return Err(DbSqlError::ConfigError(format!(
                "driver {name} is already registered"
            )));
        }
        self.drivers.insert(name.to_string(), driver);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Driver> {
        self.drivers.get(name)
    }

    /// # Errors
    /// `DbSqlError::ConfigError` for an unknown name, otherwise see [`Driver::open`].
    pub async fn open(&self, name: &str, uri: &str) -> Result<Connection, DbSqlError> {
        let driver = self
            .get(name)
            .ok_or_else(|| DbSqlError::ConfigError(format!("unknown driver {name}")))?;
        driver.open(uri).await
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn drivers(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }
}
