//! Benchmark and database configuration.

use std::fmt;
use std::time::Duration;

use crate::error::BenchError;
use crate::workload::Operation;

/// Connection settings for a database backend.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 5432).
    pub port: u16,

    /// Database name.
    pub database: String,

    /// User name.
    pub user: String,

    /// Password.
    pub password: String,

    /// Application name reported to the server.
    pub application_name: String,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "benchmark_db".to_string(),
            user: "benchmark_user".to_string(),
            password: "password".to_string(),
            application_name: "pool-bench".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("application_name", &self.application_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl DbConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `key=value;` connection string.
    ///
    /// ```text
    /// Host=localhost;Port=5432;Database=benchmark_db;User=benchmark_user;Password=secret;
    /// ```
    ///
    /// Keys are case-insensitive. Unset keys keep their defaults.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, BenchError> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| BenchError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" | "data source" => {
                    if let Some((host, port)) = value.split_once(':') {
                        config.host = host.to_string();
                        config.port = parse_port(port)?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => config.port = parse_port(value)?,
                "database" | "dbname" | "initial catalog" => config.database = value.to_string(),
                "user" | "user id" | "uid" | "username" => config.user = value.to_string(),
                "password" | "pwd" => config.password = value.to_string(),
                "application name" | "application_name" | "app" => {
                    config.application_name = value.to_string();
                }
                "connect timeout" | "connect_timeout" | "connection timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| BenchError::Config(format!("invalid timeout: {value}")))?;
                    config.connect_timeout = Duration::from_secs(secs);
                }
                _ => {
                    tracing::debug!(key = key, "ignoring unknown connection string option");
                }
            }
        }

        Ok(config)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the user name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}

fn parse_port(value: &str) -> Result<u16, BenchError> {
    value
        .parse()
        .map_err(|_| BenchError::Config(format!("invalid port: {value}")))
}

/// Parameters of a benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Concurrent workers per workload.
    pub threads: usize,

    /// Pool capacities to benchmark, in order.
    pub pool_sizes: Vec<u32>,

    /// Statements each worker issues per workload.
    pub num_records: u32,

    /// Workloads to run, in order.
    pub operations: Vec<Operation>,

    /// Roll back leftover work when a connection is checked in.
    pub reset_on_release: bool,

    /// Bound on how long a worker waits for a pooled connection.
    pub acquire_timeout: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            threads: 5,
            pool_sizes: vec![5, 10, 20, 50],
            num_records: 1000,
            operations: Operation::ALL.to_vec(),
            reset_on_release: false,
            acquire_timeout: None,
        }
    }
}

impl BenchConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the pool capacities to benchmark.
    #[must_use]
    pub fn pool_sizes(mut self, sizes: Vec<u32>) -> Self {
        self.pool_sizes = sizes;
        self
    }

    /// Set the per-worker statement count.
    #[must_use]
    pub fn num_records(mut self, records: u32) -> Self {
        self.num_records = records;
        self
    }

    /// Set the workloads to run.
    #[must_use]
    pub fn operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = operations;
        self
    }

    /// Enable or disable rollback on check-in.
    #[must_use]
    pub fn reset_on_release(mut self, enabled: bool) -> Self {
        self.reset_on_release = enabled;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Check the configuration for consistency.
    ///
    /// A pool smaller than the worker count is allowed but logged, since
    /// workers then queue for connections.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.threads == 0 {
            return Err(BenchError::Config("threads must be at least 1".into()));
        }
        if self.pool_sizes.is_empty() {
            return Err(BenchError::Config("at least one pool size is required".into()));
        }
        if self.pool_sizes.contains(&0) {
            return Err(BenchError::Config("pool sizes must be at least 1".into()));
        }
        if self.num_records == 0 || i32::try_from(self.num_records).is_err() {
            return Err(BenchError::Config(format!(
                "num_records must be between 1 and {}",
                i32::MAX
            )));
        }
        if self.operations.is_empty() {
            return Err(BenchError::Config("at least one operation is required".into()));
        }
        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(BenchError::Config("acquire_timeout must be non-zero".into()));
        }

        for &size in &self.pool_sizes {
            if (size as usize) < self.threads {
                tracing::warn!(
                    pool_size = size,
                    threads = self.threads,
                    "pool size is smaller than the worker count; workers will queue"
                );
            }
        }
        Ok(())
    }
}
