use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{ConnectionTrait, DbBackend, DbErr, QueryResult, Statement, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheLayer};
use crate::error::{BiometricError, BiometricResult, bounded};
use crate::models::{EnrollmentRecord, EnrollmentStatus, Gallery, TenantId, UserId};
use crate::pool::ConnectionPoolManager;

/// Raw access to a tenant's enrollment table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// All active records in ascending id order
    async fn fetch_active(&self, tenant_id: TenantId) -> BiometricResult<Gallery>;

    /// Most recent active record of a user
    async fn fetch_latest_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> BiometricResult<Option<EnrollmentRecord>>;

    /// Delete every row of the user, then insert one active row
    async fn replace_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        label: &str,
        embedding: &[f32],
    ) -> BiometricResult<EnrollmentRecord>;

    async fn delete_by_id(&self, tenant_id: TenantId, id: i64) -> BiometricResult<bool>;

    /// Returns the number of rows removed
    async fn delete_by_label(&self, tenant_id: TenantId, label: &str) -> BiometricResult<u64>;
}

/// Per-tenant table name; the tenant id is numeric so it is safe to inline.
fn enrollment_table(tenant_id: TenantId) -> String {
    format!("enrollment_{}", tenant_id)
}

const RECORD_COLUMNS: &str = "id, user_id, label, face_encoding, status, created_at";

/// Enrollment repository over the tenant's own MySQL database
#[derive(Clone)]
pub struct SqlEnrollmentRepository {
    pools: ConnectionPoolManager,
}

impl SqlEnrollmentRepository {
    pub fn new(pools: ConnectionPoolManager) -> Self {
        Self { pools }
    }
}

fn statement(sql: String, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(DbBackend::MySql, sql, values)
}

/// Decode the stored embedding, held either as JSON text or a JSON column.
fn decode_embedding(row: &QueryResult) -> Result<Vec<f32>, String> {
    let parsed = match row.try_get::<String>("", "face_encoding") {
        Ok(text) => serde_json::from_str(&text),
        Err(_) => {
            let json: serde_json::Value = row.try_get("", "face_encoding").map_err(|e| e.to_string())?;
            serde_json::from_value(json)
        }
    };
    parsed.map_err(|e| e.to_string())
}

struct RecordRow {
    record: EnrollmentRecord,
    embedding: Result<Vec<f32>, String>,
}

fn record_from_row(tenant_id: TenantId, row: &QueryResult) -> Result<RecordRow, DbErr> {
    let status = row
        .try_get::<String>("", "status")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(EnrollmentStatus::Active);

    Ok(RecordRow {
        record: EnrollmentRecord {
            id: row.try_get("", "id")?,
            tenant_id,
            user_id: row.try_get("", "user_id")?,
            label: row.try_get("", "label")?,
            embedding: Vec::new(),
            status,
            created_at: row.try_get::<Option<NaiveDateTime>>("", "created_at")?,
        },
        embedding: decode_embedding(row),
    })
}

#[async_trait]
impl EnrollmentRepository for SqlEnrollmentRepository {
    async fn fetch_active(&self, tenant_id: TenantId) -> BiometricResult<Gallery> {
        let sql = format!(
            "SELECT {} FROM `{}` WHERE status = 'active' ORDER BY id ASC",
            RECORD_COLUMNS,
            enrollment_table(tenant_id)
        );
        let conn = self.pools.get_connection(tenant_id).await?;
        let rows = conn.query_all_raw(statement(sql, vec![])).await?;

        let mut gallery = Gallery::default();
        for row in &rows {
            let RecordRow { mut record, embedding } = record_from_row(tenant_id, row)?;
            match embedding {
                Ok(embedding) => {
                    record.embedding = embedding;
                    gallery.records.push(record);
                }
                Err(e) => {
                    warn!(tenant_id, enrollment_id = record.id, error = %e, "Skipping enrollment with malformed embedding");
                    gallery.malformed += 1;
                }
            }
        }
        Ok(gallery)
    }

    async fn fetch_latest_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> BiometricResult<Option<EnrollmentRecord>> {
        let sql = format!(
            "SELECT {} FROM `{}` WHERE user_id = ? AND status = 'active' \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            RECORD_COLUMNS,
            enrollment_table(tenant_id)
        );
        let conn = self.pools.get_connection(tenant_id).await?;
        let Some(row) = conn.query_one_raw(statement(sql, vec![user_id.into()])).await? else {
            return Ok(None);
        };

        let RecordRow { mut record, embedding } = record_from_row(tenant_id, &row)?;
        match embedding {
            Ok(embedding) => record.embedding = embedding,
            // left empty, so every comparison reports it as incompatible
            Err(e) => {
                warn!(tenant_id, user_id, enrollment_id = record.id, error = %e, "Enrollment has malformed embedding");
            }
        }
        Ok(Some(record))
    }

    async fn replace_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        label: &str,
        embedding: &[f32],
    ) -> BiometricResult<EnrollmentRecord> {
        let table = enrollment_table(tenant_id);
        let created_at = Utc::now().naive_utc();
        let encoded = serde_json::to_string(embedding)?;

        let conn = self.pools.get_connection(tenant_id).await?;
        conn.execute_raw(statement(
            format!("DELETE FROM `{}` WHERE user_id = ?", table),
            vec![user_id.into()],
        ))
        .await?;
        let inserted = conn
            .execute_raw(statement(
                format!(
                    "INSERT INTO `{}` (user_id, label, face_encoding, status, created_at) \
                     VALUES (?, ?, ?, 'active', ?)",
                    table
                ),
                vec![user_id.into(), label.into(), encoded.into(), created_at.into()],
            ))
            .await?;
        conn.commit().await?;

        let id = i64::try_from(inserted.last_insert_id())
            .map_err(|_| BiometricError::Internal("insert id out of range".to_string()))?;

        Ok(EnrollmentRecord {
            id,
            tenant_id,
            user_id,
            label: label.to_string(),
            embedding: embedding.to_vec(),
            status: EnrollmentStatus::Active,
            created_at: Some(created_at),
        })
    }

    async fn delete_by_id(&self, tenant_id: TenantId, id: i64) -> BiometricResult<bool> {
        let sql = format!("DELETE FROM `{}` WHERE id = ?", enrollment_table(tenant_id));
        let conn = self.pools.get_connection(tenant_id).await?;
        let result = conn.execute_raw(statement(sql, vec![id.into()])).await?;
        conn.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_label(&self, tenant_id: TenantId, label: &str) -> BiometricResult<u64> {
        let sql = format!("DELETE FROM `{}` WHERE label = ?", enrollment_table(tenant_id));
        let conn = self.pools.get_connection(tenant_id).await?;
        let result = conn.execute_raw(statement(sql, vec![label.into()])).await?;
        conn.commit().await?;
        Ok(result.rows_affected())
    }
}

/// In-memory implementation of EnrollmentRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryEnrollmentRepository {
    tables: Arc<RwLock<HashMap<TenantId, Vec<EnrollmentRecord>>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryEnrollmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryEnrollmentRepository {
    async fn fetch_active(&self, tenant_id: TenantId) -> BiometricResult<Gallery> {
        let tables = self.tables.read().await;
        let mut records = tables.get(&tenant_id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.id);
        Ok(Gallery { records, malformed: 0 })
    }

    async fn fetch_latest_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> BiometricResult<Option<EnrollmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&tenant_id)
            .into_iter()
            .flatten()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn replace_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        label: &str,
        embedding: &[f32],
    ) -> BiometricResult<EnrollmentRecord> {
        let mut tables = self.tables.write().await;
        let mut next_id = self.next_id.write().await;
        *next_id += 1;

        let record = EnrollmentRecord {
            id: *next_id,
            tenant_id,
            user_id,
            label: label.to_string(),
            embedding: embedding.to_vec(),
            status: EnrollmentStatus::Active,
            created_at: Some(Utc::now().naive_utc()),
        };

        let table = tables.entry(tenant_id).or_default();
        table.retain(|r| r.user_id != user_id);
        table.push(record.clone());
        Ok(record)
    }

    async fn delete_by_id(&self, tenant_id: TenantId, id: i64) -> BiometricResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&tenant_id) else {
            return Ok(false);
        };
        let before = table.len();
        table.retain(|r| r.id != id);
        Ok(table.len() < before)
    }

    async fn delete_by_label(&self, tenant_id: TenantId, label: &str) -> BiometricResult<u64> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&tenant_id) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|r| r.label != label);
        Ok((before - table.len()) as u64)
    }
}

/// Cached enrollment reads and invalidating writes
///
/// List and per-user reads are cache-aside with the encoding TTL. `add`
/// invalidates the list and the user's key; both deletes invalidate only the
/// list, so a per-user entry may outlive a delete until its TTL lapses.
#[derive(Clone)]
pub struct EnrollmentStore {
    repository: Arc<dyn EnrollmentRepository>,
    cache: CacheLayer,
    ttl: Duration,
    timeout: Duration,
}

impl EnrollmentStore {
    pub fn new(
        repository: Arc<dyn EnrollmentRepository>,
        cache: CacheLayer,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            ttl,
            timeout,
        }
    }

    pub async fn list(&self, tenant_id: TenantId) -> BiometricResult<Gallery> {
        let key = CacheKey::Enrollments(tenant_id);
        if let Some(gallery) = self.cache.get_json::<Gallery>(&key).await {
            return Ok(gallery);
        }

        let gallery = bounded("enrollment store", self.timeout, self.repository.fetch_active(tenant_id)).await?;
        if gallery.malformed > 0 {
            warn!(tenant_id, malformed = gallery.malformed, "Gallery loaded with malformed records skipped");
        }
        debug!(tenant_id, count = gallery.len(), "Loaded gallery");

        self.cache.put_json(&key, &gallery, self.ttl).await;
        Ok(gallery)
    }

    /// Latest active enrollment of a user, if any
    pub async fn find_by_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> BiometricResult<Option<EnrollmentRecord>> {
        let key = CacheKey::UserEnrollment(tenant_id, user_id);
        if let Some(record) = self.cache.get_json::<EnrollmentRecord>(&key).await {
            return Ok(Some(record));
        }

        let record = bounded(
            "enrollment store",
            self.timeout,
            self.repository.fetch_latest_for_user(tenant_id, user_id),
        )
        .await?;

        if let Some(record) = &record {
            self.cache.put_json(&key, record, self.ttl).await;
        }
        Ok(record)
    }

    pub async fn get_by_user(&self, tenant_id: TenantId, user_id: UserId) -> BiometricResult<EnrollmentRecord> {
        self.find_by_user(tenant_id, user_id).await?.ok_or_else(|| {
            BiometricError::NotFound(format!("user {} has no enrollment in tenant {}", user_id, tenant_id))
        })
    }

    /// Replace the user's enrollment
    ///
    /// The embedding dimension is not checked here.
    pub async fn add(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        label: &str,
        embedding: &[f32],
    ) -> BiometricResult<EnrollmentRecord> {
        let record = bounded(
            "enrollment store",
            self.timeout,
            self.repository.replace_for_user(tenant_id, user_id, label, embedding),
        )
        .await?;

        info!(tenant_id, user_id, enrollment_id = record.id, "Stored enrollment");
        self.cache.invalidate(&CacheKey::Enrollments(tenant_id)).await;
        self.cache.invalidate(&CacheKey::UserEnrollment(tenant_id, user_id)).await;
        Ok(record)
    }

    pub async fn delete_by_id(&self, tenant_id: TenantId, id: i64) -> BiometricResult<bool> {
        let removed = bounded("enrollment store", self.timeout, self.repository.delete_by_id(tenant_id, id)).await?;

        info!(tenant_id, enrollment_id = id, removed, "Deleted enrollment by id");
        self.cache.invalidate(&CacheKey::Enrollments(tenant_id)).await;
        Ok(removed)
    }

    pub async fn delete_by_label(&self, tenant_id: TenantId, label: &str) -> BiometricResult<bool> {
        let removed = bounded(
            "enrollment store",
            self.timeout,
            self.repository.delete_by_label(tenant_id, label),
        )
        .await?;

        info!(tenant_id, label, removed, "Deleted enrollments by label");
        self.cache.invalidate(&CacheKey::Enrollments(tenant_id)).await;
        Ok(removed > 0)
    }

    /// Drop the cached gallery
    pub async fn invalidate_list(&self, tenant_id: TenantId) -> BiometricResult<bool> {
        self.cache.delete(&CacheKey::Enrollments(tenant_id)).await
    }
}
