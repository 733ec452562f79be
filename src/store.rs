use crate::model::CounterRecord;
use crate::model::TableName;
use crate::model::COUNTER_ID;
use crate::pool::DbPool;
use anyhow::anyhow;
use anyhow::Context;
use async_bb8_diesel::AsyncRunQueryDsl;
use async_bb8_diesel::AsyncSimpleConnection;
use async_trait::async_trait;
use diesel::sql_types::BigInt;
use diesel::sql_types::Text;

/// Value an absent record is treated as holding before the first increment
const START: i64 = 0;
const INCREMENT: i64 = 1;

/// Any failure of the atomic increment: connectivity, pool timeout,
/// permissions, a missing table, or a result we could not decode.
///
/// The message already carries the whole context chain, so the failure
/// reports no `source()` of its own.
#[derive(Debug, thiserror::Error)]
#[error("{0:#}")]
pub struct StoreOperationFailure(anyhow::Error);

impl From<anyhow::Error> for StoreOperationFailure {
    fn from(error: anyhow::Error) -> Self {
        StoreOperationFailure(error)
    }
}

/// Durable home of the counter record
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically adds one to the record, creating it first if it does not
    /// exist, and returns the record as it stands after the update.  Either
    /// the whole update applies or none of it does.
    async fn increment(&self) -> Result<CounterRecord, StoreOperationFailure>;
}

/// Counter store backed by a PostgreSQL table
pub struct PgCounterStore {
    pool: DbPool,
    table: TableName,
    upsert_sql: String,
}

impl PgCounterStore {
    pub fn new(pool: DbPool, table: TableName) -> PgCounterStore {
        // A single statement, so Postgres takes the row lock for us and
        // concurrent upserts serialize on it.
        let upsert_sql = format!(
            "INSERT INTO {table} (id, visitor_count) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE \
             SET visitor_count = {table}.visitor_count + $3 \
             RETURNING id, visitor_count",
            table = table.quoted(),
        );
        PgCounterStore { pool, table, upsert_sql }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Creates the counter table if it is not there already.  The record
    /// itself is left for the first increment to create.
    pub async fn ensure_table(&self) -> anyhow::Result<()> {
        self.pool
            .batch_execute_async(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    visitor_count BIGINT NOT NULL CHECK (visitor_count >= 0)
                )",
                self.table.quoted(),
            ))
            .await
            .with_context(|| format!("creating table {}", self.table))
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self) -> Result<CounterRecord, StoreOperationFailure> {
        let query = diesel::sql_query(self.upsert_sql.clone())
            .bind::<Text, _>(COUNTER_ID)
            .bind::<BigInt, _>(START + INCREMENT)
            .bind::<BigInt, _>(INCREMENT);
        let record: CounterRecord =
            query.get_result_async(&self.pool).await.with_context(|| {
                format!("incrementing visitor count in {}", self.table)
            })?;
        if record.id != COUNTER_ID || record.visitor_count < START + INCREMENT
        {
            return Err(anyhow!(
                "unexpected record from {}: id {:?}, visitor_count {}",
                self.table,
                record.id,
                record.visitor_count
            )
            .into());
        }
        Ok(record)
    }
}
