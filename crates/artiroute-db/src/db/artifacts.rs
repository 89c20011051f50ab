//! Artifact record repository: `models` and `datasets` tables.

use artiroute_core::{AppError, ArtifactKind, StorageAction};
use artiroute_storage::locations;
use artiroute_storage::paths::derive_file_name;
use artiroute_storage::{ArtifactRecordStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres};

use super::transaction::with_transaction;

const COLUMNS: &str = "id, name, file_name, legacy_path, storage_server, size_mb, created_at";

fn table(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Model => "models",
        ArtifactKind::Dataset => "datasets",
    }
}

/// Row type shared by both tables (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct ArtifactRow {
    pub id: i64,
    pub name: String,
    pub file_name: String,
    pub legacy_path: String,
    pub storage_server: String,
    pub size_mb: f64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn into_record(self, kind: ArtifactKind) -> ArtifactRecord {
        ArtifactRecord {
            id: self.id,
            kind,
            name: self.name,
            file_name: derive_file_name(&self.file_name, &self.legacy_path).unwrap_or_default(),
            storage_servers: locations::decode(&self.storage_server),
            size_mb: self.size_mb,
            created_at: self.created_at,
        }
    }
}

/// A model or dataset record with its decoded Location Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub kind: ArtifactKind,
    pub name: String,
    pub file_name: String,
    pub storage_servers: Vec<String>,
    pub size_mb: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ArtifactRecordRepository {
    pool: PgPool,
}

impl ArtifactRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a record with a normalized Location Set.
    #[tracing::instrument(skip(self, servers), fields(db.table = table(kind)))]
    pub async fn create(
        &self,
        kind: ArtifactKind,
        name: &str,
        file_name: &str,
        servers: &[String],
        size_mb: f64,
    ) -> Result<ArtifactRecord, AppError> {
        let sql = format!(
            "INSERT INTO {} (name, file_name, storage_server, size_mb) VALUES ($1, $2, $3, $4) RETURNING {}",
            table(kind),
            COLUMNS
        );
        let row: ArtifactRow = sqlx::query_as::<Postgres, ArtifactRow>(&sql)
            .bind(name.trim())
            .bind(file_name.trim())
            .bind(locations::encode(servers))
            .bind(size_mb)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_record(kind))
    }

    #[tracing::instrument(skip(self), fields(db.table = table(kind), db.record_id = %id))]
    pub async fn get(&self, kind: ArtifactKind, id: i64) -> Result<Option<ArtifactRecord>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, table(kind));
        let row: Option<ArtifactRow> = sqlx::query_as::<Postgres, ArtifactRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_record(kind)))
    }

    /// Page of records, newest first.
    #[tracing::instrument(skip(self), fields(db.table = table(kind)))]
    pub async fn list(
        &self,
        kind: ArtifactKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ArtifactRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            COLUMNS,
            table(kind)
        );
        let rows: Vec<ArtifactRow> = sqlx::query_as::<Postgres, ArtifactRow>(&sql)
            .bind(limit.clamp(1, 1000))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_record(kind)).collect())
    }

    /// Rewrite every row's location column into the canonical JSON array form.
    #[tracing::instrument(skip(self), fields(db.table = table(kind)))]
    pub async fn normalize_locations(&self, kind: ArtifactKind) -> Result<u64, AppError> {
        let sql = format!("SELECT id, storage_server FROM {}", table(kind));
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let update = format!("UPDATE {} SET storage_server = $1 WHERE id = $2", table(kind));
        let mut changed = 0;
        for (id, raw) in rows {
            let normalized = locations::normalize_field(&raw);
            if normalized == raw {
                continue;
            }
            sqlx::query(&update)
                .bind(&normalized)
                .bind(id)
                .execute(&self.pool)
                .await?;
            changed += 1;
        }

        tracing::info!(table = table(kind), changed, "Normalized location columns");
        Ok(changed)
    }

    /// Apply a Location Set action under a row lock.
    ///
    /// Returns `None` when the record does not exist.
    #[tracing::instrument(skip(self, servers), fields(db.table = table(kind), db.record_id = %id, action = %action))]
    pub async fn apply_locations(
        &self,
        kind: ArtifactKind,
        id: i64,
        action: StorageAction,
        servers: &[String],
    ) -> Result<Option<Vec<String>>, AppError> {
        let select = format!("SELECT storage_server FROM {} WHERE id = $1 FOR UPDATE", table(kind));
        let update = format!("UPDATE {} SET storage_server = $1 WHERE id = $2", table(kind));
        let servers = servers.to_vec();

        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                let current: Option<(String,)> = sqlx::query_as(&select)
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?;
                let Some((raw,)) = current else {
                    return Ok(None);
                };

                let updated = locations::apply_action(&locations::decode(&raw), action, &servers);
                sqlx::query(&update)
                    .bind(locations::encode(&updated))
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                Ok::<_, AppError>(Some(updated))
            })
        })
        .await
    }
}

fn metadata_error(e: AppError) -> StorageError {
    StorageError::Metadata(e.to_string())
}

#[async_trait]
impl ArtifactRecordStore for ArtifactRecordRepository {
    async fn file_name(&self, kind: ArtifactKind, id: i64) -> StorageResult<String> {
        let record = self
            .get(kind, id)
            .await
            .map_err(metadata_error)?
            .ok_or(StorageError::RecordNotFound { kind, id })?;
        if record.file_name.is_empty() {
            tracing::warn!(kind = %kind, id, "Record has no file name");
            return Err(StorageError::EmptyFileName(format!("{} {} has no file name", kind, id)));
        }
        Ok(record.file_name)
    }

    async fn locations(&self, kind: ArtifactKind, id: i64) -> StorageResult<Vec<String>> {
        self.get(kind, id)
            .await
            .map_err(metadata_error)?
            .map(|record| record.storage_servers)
            .ok_or(StorageError::RecordNotFound { kind, id })
    }

    async fn update_locations(
        &self,
        kind: ArtifactKind,
        id: i64,
        action: StorageAction,
        servers: &[String],
    ) -> StorageResult<Vec<String>> {
        let updated = self
            .apply_locations(kind, id, action, servers)
            .await
            .map_err(metadata_error)?
            .ok_or(StorageError::RecordNotFound { kind, id })?;
        tracing::info!(kind = %kind, id, action = %action, count = updated.len(), "Location set updated");
        Ok(updated)
    }
}
