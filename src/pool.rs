use crate::config::DatabaseConfig;
use crate::DbConnection;
use anyhow::Context;
use async_bb8_diesel::AsyncSimpleConnection;
use async_bb8_diesel::Connection;
use async_bb8_diesel::ConnectionError;
use async_trait::async_trait;
use slog::error;
use std::time::Duration;

pub type DbPool = bb8::Pool<async_bb8_diesel::ConnectionManager<DbConnection>>;

pub async fn create_pool(
    log: slog::Logger,
    db_url: &str,
    config: &DatabaseConfig,
) -> anyhow::Result<DbPool> {
    let error_sink = LoggingErrorSink::new(log.clone());
    let manager = async_bb8_diesel::ConnectionManager::new(db_url);
    bb8::Builder::new()
        .error_sink(Box::new(error_sink))
        .connection_customizer(Box::new(StatementTimeout {
            millis: config.statement_timeout_ms,
        }))
        .max_size(config.max_connections)
        .connection_timeout(Duration::from_secs(
            config.connection_timeout_secs,
        ))
        .build(manager)
        .await
        .context("building pool")
}

// LoggingErrorSink is cribbed from Omicron
#[derive(Clone, Debug)]
struct LoggingErrorSink {
    log: slog::Logger,
}

impl LoggingErrorSink {
    fn new(log: slog::Logger) -> LoggingErrorSink {
        LoggingErrorSink { log }
    }
}

impl bb8::ErrorSink<ConnectionError> for LoggingErrorSink {
    fn sink(&self, error: ConnectionError) {
        error!(
            &self.log,
            "database connection error";
            "error_message" => #%error
        );
    }

    fn boxed_clone(&self) -> Box<dyn bb8::ErrorSink<ConnectionError>> {
        Box::new(self.clone())
    }
}

/// Bounds every statement run on a pooled connection, so a wedged database
/// turns into a failed request instead of a hung one.
#[derive(Debug)]
struct StatementTimeout {
    millis: u64,
}

#[async_trait]
impl bb8::CustomizeConnection<Connection<DbConnection>, ConnectionError>
    for StatementTimeout
{
    async fn on_acquire(
        &self,
        conn: &mut Connection<DbConnection>,
    ) -> Result<(), ConnectionError> {
        conn.batch_execute_async(&format!(
            "SET statement_timeout = {}",
            self.millis
        ))
        .await
        .map_err(|e| e.into())
    }
}
