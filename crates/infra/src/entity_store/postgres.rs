//! Postgres-backed entity store.
//!
//! Schema lives in `migrations/0001_protected_entities.sql`: one table per
//! domain-backed resource type (sharing the same column layout), the
//! `resource_index` table and the `dangling_resources` ledger.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use botforge_auth::ResourceType;
use botforge_core::OwnerId;

use super::r#trait::{DanglingResource, EntityRecord, EntityStore, StoreError, StoreTransaction};

/// Postgres-backed transactional entity store.
///
/// Uses the SQLx connection pool (thread-safe). Inserts write the entity row and
/// its `resource_index` row in the same transaction.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: Arc<PgPool>,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a new pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the entity tables, resource index and ledger if missing. Idempotent.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

const SCHEMA: &str = include_str!("../../migrations/0001_protected_entities.sql");

/// Table holding rows of a domain-backed resource type.
fn table_for(resource_type: ResourceType) -> Result<&'static str, StoreError> {
    match resource_type {
        ResourceType::Bot => Ok("bots"),
        ResourceType::Strategy => Ok("strategies"),
        ResourceType::Exchange => Ok("exchanges"),
        ResourceType::Runner => Ok("runners"),
        ResourceType::Group => Err(StoreError::InvalidRecord(
            "group resources have no backing table".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresEntityStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }

    #[instrument(skip(self), fields(resource_type = %resource_type, id = %id), err)]
    async fn find(&self, resource_type: ResourceType, id: Uuid) -> Result<Option<EntityRecord>, StoreError> {
        let table = table_for(resource_type)?;
        let span = Span::current();
        span.record("operation", "find_entity");

        let row = sqlx::query(&format!(
            r#"
            SELECT id, name, owner_id, public, payload, created_at
            FROM {table}
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_entity", e))?;

        row.map(|r| record_from_row(resource_type, &r)).transpose()
    }

    #[instrument(skip(self), fields(id = %id), err)]
    async fn indexed_type(&self, id: Uuid) -> Result<Option<ResourceType>, StoreError> {
        let row = sqlx::query("SELECT resource_type FROM resource_index WHERE resource_id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("indexed_type", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tag: String = row
            .try_get("resource_type")
            .map_err(|e| StoreError::InvalidRecord(format!("failed to read resource_type: {e}")))?;
        tag.parse::<ResourceType>()
            .map(Some)
            .map_err(|e| StoreError::InvalidRecord(format!("{e}")))
    }

    #[instrument(skip(self, entry), fields(resource_id = %entry.resource_id), err)]
    async fn record_dangling(&self, entry: DanglingResource) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dangling_resources (resource_id, resource_type, reason, attempts, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (resource_id)
            DO UPDATE SET
                reason = EXCLUDED.reason,
                attempts = dangling_resources.attempts + 1
            "#,
        )
        .bind(&entry.resource_id)
        .bind(entry.resource_type.as_str())
        .bind(&entry.reason)
        .bind(entry.attempts as i32)
        .bind(entry.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_dangling", e))?;
        Ok(())
    }

    async fn dangling_resources(&self, limit: usize) -> Result<Vec<DanglingResource>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT resource_id, resource_type, reason, attempts, recorded_at
            FROM dangling_resources
            ORDER BY recorded_at ASC, resource_id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("dangling_resources", e))?;

        rows.iter().map(dangling_from_row).collect()
    }

    async fn clear_dangling(&self, resource_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM dangling_resources WHERE resource_id = $1")
            .bind(resource_id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_dangling", e))?;
        Ok(())
    }
}

/// An open Postgres transaction. Dropping it unfinished rolls back.
struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionFinished)
    }
}

#[async_trait::async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError> {
        let table = table_for(record.resource_type)?;
        let tx = self.open()?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (id, name, owner_id, public, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#
        ))
        .bind(record.id)
        .bind(&record.name)
        .bind(record.owner_id.as_str())
        .bind(record.public)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entity", e))?;

        sqlx::query("INSERT INTO resource_index (resource_id, resource_type) VALUES ($1, $2)")
            .bind(record.id)
            .bind(record.resource_type.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_resource_index", e))?;

        Ok(())
    }

    async fn delete(&mut self, resource_type: ResourceType, id: Uuid) -> Result<bool, StoreError> {
        let table = table_for(resource_type)?;
        let tx = self.open()?;

        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_entity", e))?;

        sqlx::query("DELETE FROM resource_index WHERE resource_id = $1 AND resource_type = $2")
            .bind(id)
            .bind(resource_type.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_resource_index", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionFinished)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionFinished)?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn record_from_row(resource_type: ResourceType, row: &sqlx::postgres::PgRow) -> Result<EntityRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::InvalidRecord(format!("failed to decode entity row: {e}"));

    let owner: String = row.try_get("owner_id").map_err(decode)?;
    Ok(EntityRecord {
        id: row.try_get("id").map_err(decode)?,
        resource_type,
        name: row.try_get("name").map_err(decode)?,
        owner_id: OwnerId::new(owner).map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
        public: row.try_get("public").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
    })
}

fn dangling_from_row(row: &sqlx::postgres::PgRow) -> Result<DanglingResource, StoreError> {
    let decode = |e: sqlx::Error| StoreError::InvalidRecord(format!("failed to decode ledger row: {e}"));

    let tag: String = row.try_get("resource_type").map_err(decode)?;
    let attempts: i32 = row.try_get("attempts").map_err(decode)?;
    Ok(DanglingResource {
        resource_id: row.try_get("resource_id").map_err(decode)?,
        resource_type: tag
            .parse::<ResourceType>()
            .map_err(|e| StoreError::InvalidRecord(format!("{e}")))?,
        reason: row.try_get("reason").map_err(decode)?,
        attempts: attempts.max(0) as u32,
        recorded_at: row.try_get("recorded_at").map_err(decode)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
