//! Connections to target database clusters.
//!
//! [`ClusterConnector`] opens one dedicated [`ClusterSession`] per ticket
//! execution; sessions are never pooled. The production implementation
//! speaks the MySQL protocol through sqlx; tests inject scripted fakes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use thiserror::Error;
use tracing::{debug, warn};

/// Where and as whom to connect. The password is already decrypted.
#[derive(Clone)]
pub struct ClusterTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Default schema for the session.
    pub database: String,
}

impl std::fmt::Debug for ClusterTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterTarget")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Driver(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Boxed future alias for cluster operations.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// One open connection, used for a single ticket.
pub trait ClusterSession: Send {
    /// Run one text statement. Returns the number of rows affected.
    fn execute<'a>(&'a mut self, sql: &'a str) -> ClusterFuture<'a, u64>;

    /// Close the connection. Errors are logged, not returned.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Opens sessions against a cluster.
pub trait ClusterConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        target: &'a ClusterTarget,
    ) -> ClusterFuture<'a, Box<dyn ClusterSession>>;
}

/// MySQL-protocol connector.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ClusterConnector for MySqlConnector {
    fn connect<'a>(
        &'a self,
        target: &'a ClusterTarget,
    ) -> ClusterFuture<'a, Box<dyn ClusterSession>> {
        Box::pin(async move {
            let options = MySqlConnectOptions::new()
                .host(&target.host)
                .port(target.port)
                .username(&target.username)
                .password(&target.password)
                .database(&target.database);
            let conn = tokio::time::timeout(self.connect_timeout, options.connect())
                .await
                .map_err(|_| ClusterError::Timeout(self.connect_timeout))?
                .map_err(|e| ClusterError::Connect(e.to_string()))?;
            debug!(cluster = %target.name, database = %target.database, "cluster session opened");
            Ok(Box::new(MySqlSession { conn }) as Box<dyn ClusterSession>)
        })
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

impl ClusterSession for MySqlSession {
    fn execute<'a>(&'a mut self, sql: &'a str) -> ClusterFuture<'a, u64> {
        Box::pin(async move {
            let conn: &'a mut MySqlConnection = &mut self.conn;
            let result = sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
                .await
                .map_err(|e| ClusterError::Driver(e.to_string()))?;
            Ok(result.rows_affected())
        })
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.conn.close().await {
                warn!(error = %e, "cluster session close failed");
            }
        })
    }
}
