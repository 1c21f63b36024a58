//! PostgreSQL backend.
//!
//! Uses the blocking `postgres` client. Each session runs its writes inside
//! an explicit transaction that is opened by the first write and closed by
//! `commit` or `rollback`, matching the driver-level behavior the benchmark
//! measures.

use ::postgres::{Client, Config, NoTls};

use crate::backend::{Backend, CREATE_TABLE_SQL, Row, Session, Statement};
use crate::config::DbConfig;
use crate::error::BackendError;

/// PostgreSQL benchmark backend.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    config: Config,
}

impl PostgresBackend {
    /// Create a backend from connection settings.
    #[must_use]
    pub fn new(db: &DbConfig) -> Self {
        let mut config = Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .dbname(&db.database)
            .user(&db.user)
            .password(&db.password)
            .application_name(&db.application_name)
            .connect_timeout(db.connect_timeout);
        Self { config }
    }

    fn open(&self) -> Result<Client, BackendError> {
        self.config.connect(NoTls).map_err(|e| {
            tracing::warn!(error = %e, "failed to connect to PostgreSQL");
            BackendError::Connect(e.to_string())
        })
    }
}

impl Backend for PostgresBackend {
    type Session = PostgresSession;

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn connect(&self) -> Result<PostgresSession, BackendError> {
        Ok(PostgresSession {
            client: self.open()?,
            in_transaction: false,
        })
    }

    fn prepare_table(&self) -> Result<(), BackendError> {
        let mut client = self.open()?;
        client.batch_execute(CREATE_TABLE_SQL)?;
        tracing::debug!("benchmark table recreated");
        Ok(())
    }
}

/// Session on a [`PostgresBackend`].
pub struct PostgresSession {
    client: Client,
    in_transaction: bool,
}

impl PostgresSession {
    fn begin(&mut self) -> Result<(), BackendError> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Session for PostgresSession {
    fn execute(&mut self, stmt: &Statement<'_>) -> Result<u64, BackendError> {
        self.begin()?;
        let affected = match *stmt {
            Statement::Insert { data } => self.client.execute(stmt.sql(), &[&data])?,
            Statement::Update { id, data } => self.client.execute(stmt.sql(), &[&id, &data])?,
            Statement::Select { .. } => {
                return Err(BackendError::Statement(
                    "SELECT must be issued with query_one".into(),
                ));
            }
        };
        Ok(affected)
    }

    fn query_one(&mut self, stmt: &Statement<'_>) -> Result<Option<Row>, BackendError> {
        let Statement::Select { id } = *stmt else {
            return Err(BackendError::Statement(format!(
                "query_one expects a SELECT, got: {}",
                stmt.sql()
            )));
        };
        let Some(row) = self.client.query_opt(stmt.sql(), &[&id])? else {
            return Ok(None);
        };
        Ok(Some(Row {
            id: row.try_get(0)?,
            data: row.try_get::<_, Option<String>>(1)?.unwrap_or_default(),
        }))
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        if self.in_transaction {
            self.client.batch_execute("ROLLBACK")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}
