use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{Result, SagaId, SagaRecord, SagaStoreError, Version, store::SagaStore};

/// PostgreSQL-backed saga store.
///
/// One row per active saga in `saga_state`. Version checks are folded into
/// the `WHERE` clause of each write so a conflicting writer affects zero rows.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<SagaRecord> {
        Ok(SagaRecord {
            saga_id: SagaId::from(row.try_get::<String, _>("saga_id")?),
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Explains why a versioned write matched no rows.
    async fn write_miss(&self, saga_id: &SagaId, expected: Version) -> SagaStoreError {
        let current: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM saga_state WHERE saga_id = $1")
                .bind(saga_id.as_str())
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(actual)) => SagaStoreError::ConcurrencyConflict {
                saga_id: saga_id.clone(),
                expected,
                actual: Version::new(actual),
            },
            Ok(None) => SagaStoreError::NotFound(saga_id.clone()),
            Err(e) => SagaStoreError::Database(e),
        }
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn insert(&self, saga_id: &SagaId, state: serde_json::Value) -> Result<Version> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO saga_state (saga_id, version, state)
            VALUES ($1, $2, $3)
            ON CONFLICT (saga_id) DO NOTHING
            "#,
        )
        .bind(saga_id.as_str())
        .bind(Version::first().as_i64())
        .bind(&state)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(SagaStoreError::AlreadyExists(saga_id.clone()));
        }

        metrics::counter!("saga_store_writes_total", "op" => "insert").increment(1);
        Ok(Version::first())
    }

    async fn load(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        let row = sqlx::query(
            r#"
            SELECT saga_id, version, state, created_at, updated_at
            FROM saga_state
            WHERE saga_id = $1
            "#,
        )
        .bind(saga_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn update(
        &self,
        saga_id: &SagaId,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE saga_state
            SET state = $2, version = version + 1, updated_at = NOW()
            WHERE saga_id = $1 AND version = $3
            RETURNING version
            "#,
        )
        .bind(saga_id.as_str())
        .bind(&state)
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match new_version {
            Some(version) => {
                metrics::counter!("saga_store_writes_total", "op" => "update").increment(1);
                Ok(Version::new(version))
            }
            None => Err(self.write_miss(saga_id, expected).await),
        }
    }

    async fn complete(&self, saga_id: &SagaId, expected: Version) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM saga_state WHERE saga_id = $1 AND version = $2")
            .bind(saga_id.as_str())
            .bind(expected.as_i64())
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(self.write_miss(saga_id, expected).await);
        }

        metrics::counter!("saga_store_writes_total", "op" => "complete").increment(1);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id, version, state, created_at, updated_at
            FROM saga_state
            ORDER BY created_at ASC, saga_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(count = records.len(), "loaded active sagas");
        Ok(records)
    }
}
