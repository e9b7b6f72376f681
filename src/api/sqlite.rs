//! SQLite-backed gateway
//!
//! Each entity lives in its own table holding the record payload as JSON text
//! plus an optimistic-concurrency `version` column. Pages are ordered by id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::gateway::{CrudGateway, merge_fields};
use super::models::{EntityType, Page, Record, RecordId};
use crate::error::GatewayError;

#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open (or create) the database file and bootstrap the schema
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
                log::info!("Created database directory: {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        log::debug!("Connected to fleet database at {:?}", path);
        Self::from_pool(pool).await
    }

    /// Private in-memory database (a single connection that is never recycled)
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory connection string")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for entity in EntityType::all() {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version INTEGER NOT NULL DEFAULT 1,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            table = entity.name()
        );
        sqlx::query(&sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create table '{}'", entity.name()))?;
    }
    Ok(())
}

fn map_sqlx(error: sqlx::Error) -> GatewayError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            GatewayError::Unavailable(error.to_string())
        }
        other => GatewayError::Backend(other.to_string()),
    }
}

fn parse_row(row: &SqliteRow) -> Result<Record, GatewayError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;
    let version: i64 = row.try_get("version").map_err(map_sqlx)?;
    let raw: String = row.try_get("data").map_err(map_sqlx)?;
    let data = serde_json::from_str(&raw)
        .map_err(|e| GatewayError::Backend(format!("corrupt payload for record {}: {}", id, e)))?;
    Ok(Record { id, version, data })
}

fn to_i64(value: usize) -> Result<i64, GatewayError> {
    i64::try_from(value).map_err(|_| GatewayError::Rejected(format!("{} is out of range", value)))
}

#[async_trait]
impl CrudGateway for SqliteGateway {
    async fn fetch_page(&self, entity: EntityType, page: usize, page_size: usize) -> Result<Page, GatewayError> {
        if page == 0 || page_size == 0 {
            return Err(GatewayError::Rejected("page and page size start at 1".to_string()));
        }
        let offset = to_i64((page - 1).saturating_mul(page_size))?;
        let limit = to_i64(page_size)?;

        // Page and count come from one snapshot so the total matches the rows
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let sql = format!("SELECT id, version, data FROM {} ORDER BY id LIMIT ? OFFSET ?", entity.name());
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let count_sql = format!("SELECT COUNT(*) FROM {}", entity.name());
        let total: i64 = sqlx::query_scalar::<_, i64>(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;

        let items = rows.iter().map(parse_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total_count: usize::try_from(total).unwrap_or(0),
        })
    }

    async fn fetch_count(&self, entity: EntityType) -> Result<usize, GatewayError> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.name());
        let total: i64 = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn create(&self, entity: EntityType, data: &Value) -> Result<Record, GatewayError> {
        let payload = serde_json::to_string(data).map_err(|e| GatewayError::Rejected(e.to_string()))?;
        let sql = format!("INSERT INTO {} (version, data) VALUES (1, ?)", entity.name());
        let result = sqlx::query(&sql)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(Record {
            id: result.last_insert_rowid(),
            version: 1,
            data: data.clone(),
        })
    }

    async fn update(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: i64,
        data: &Value,
    ) -> Result<Record, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let select = format!("SELECT id, version, data FROM {} WHERE id = ?", entity.name());
        let row = sqlx::query(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or(GatewayError::NotFound(id))?;
        let mut record = parse_row(&row)?;
        if record.version != expected_version {
            return Err(GatewayError::Conflict { id, expected: expected_version });
        }

        merge_fields(&mut record.data, data);
        let payload = serde_json::to_string(&record.data).map_err(|e| GatewayError::Rejected(e.to_string()))?;
        let update = format!(
            "UPDATE {} SET data = ?, version = version + 1, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND version = ?",
            entity.name()
        );
        let result = sqlx::query(&update)
            .bind(&payload)
            .bind(id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::Conflict { id, expected: expected_version });
        }
        tx.commit().await.map_err(map_sqlx)?;

        record.version = expected_version + 1;
        Ok(record)
    }

    async fn delete(&self, entity: EntityType, id: RecordId) -> Result<(), GatewayError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", entity.name());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(id));
        }
        Ok(())
    }
}
