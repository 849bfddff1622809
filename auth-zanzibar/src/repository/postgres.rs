//! PostgreSQL-backed tuple store
//!
//! Tuples live in a single `relation_tuples` table:
//! - a unique constraint over the 6-field tuple key makes writes idempotent
//! - `subject_relation` is stored as `''` when absent so the constraint
//!   treats it as a value rather than a distinct NULL
//! - a subject index serves reverse lookups

use crate::{
    error::{Result, ZanzibarError},
    models::*,
    repository::TupleStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA_STATEMENTS: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS relation_tuples (
        id UUID PRIMARY KEY,
        namespace TEXT NOT NULL,
        object_id TEXT NOT NULL,
        relation TEXT NOT NULL,
        subject_namespace TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        subject_relation TEXT NOT NULL DEFAULT '',
        created_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT relation_tuples_key UNIQUE (
            namespace, object_id, relation,
            subject_namespace, subject_id, subject_relation
        )
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relation_tuples_subject_idx
        ON relation_tuples (subject_namespace, subject_id, relation)
    "#,
];

const TUPLE_COLUMNS: &str = "id, namespace, object_id, relation, \
     subject_namespace, subject_id, subject_relation, \
     created_by, created_at";

#[derive(Debug, FromRow)]
struct TupleRow {
    id: Uuid,
    namespace: String,
    object_id: String,
    relation: String,
    subject_namespace: String,
    subject_id: String,
    subject_relation: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<TupleRow> for StoredTuple {
    fn from(row: TupleRow) -> Self {
        StoredTuple {
            id: row.id,
            key: TupleKey {
                namespace: row.namespace,
                object_id: row.object_id,
                relation: row.relation,
                subject_namespace: row.subject_namespace,
                subject_id: row.subject_id,
                subject_relation: Some(row.subject_relation),
            }
            .normalized(),
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

fn subject_relation_column(key: &TupleKey) -> &str {
    key.subject_relation.as_deref().unwrap_or("")
}

/// PostgreSQL-backed tuple store
pub struct PostgresTupleStore {
    pool: PgPool,
}

impl PostgresTupleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Create the tuple table and indexes if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ZanzibarError::Storage(format!("Failed to create schema: {}", e)))?;
        }
        info!("relation_tuples schema ready");
        Ok(())
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        request: WriteTupleRequest,
    ) -> Result<StoredTuple> {
        let key = request.key.normalized();
        let insert = format!(
            "INSERT INTO relation_tuples ({TUPLE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT ON CONSTRAINT relation_tuples_key DO NOTHING \
             RETURNING {TUPLE_COLUMNS}"
        );

        let inserted = sqlx::query_as::<_, TupleRow>(&insert)
            .bind(Uuid::new_v4())
            .bind(&key.namespace)
            .bind(&key.object_id)
            .bind(&key.relation)
            .bind(&key.subject_namespace)
            .bind(&key.subject_id)
            .bind(subject_relation_column(&key))
            .bind(&request.created_by)
            .bind(Utc::now())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to write tuple: {}", e)))?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // Conflict: the row already exists, return it unchanged
        let select = format!(
            "SELECT {TUPLE_COLUMNS} FROM relation_tuples \
             WHERE namespace = $1 AND object_id = $2 AND relation = $3 \
               AND subject_namespace = $4 AND subject_id = $5 AND subject_relation = $6"
        );
        let existing = sqlx::query_as::<_, TupleRow>(&select)
            .bind(&key.namespace)
            .bind(&key.object_id)
            .bind(&key.relation)
            .bind(&key.subject_namespace)
            .bind(&key.subject_id)
            .bind(subject_relation_column(&key))
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to read existing tuple: {}", e)))?;

        Ok(existing.into())
    }

    async fn delete_in(tx: &mut Transaction<'_, Postgres>, key: &TupleKey) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM relation_tuples
            WHERE namespace = $1
              AND object_id = $2
              AND relation = $3
              AND subject_namespace = $4
              AND subject_id = $5
              AND subject_relation = $6
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.object_id)
        .bind(&key.relation)
        .bind(&key.subject_namespace)
        .bind(&key.subject_id)
        .bind(subject_relation_column(key))
        .execute(&mut **tx)
        .await
        .map_err(|e| ZanzibarError::Storage(format!("Failed to delete tuple: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to start transaction: {}", e)))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to commit transaction: {}", e)))
    }
}

#[async_trait]
impl TupleStore for PostgresTupleStore {
    async fn put(&self, request: WriteTupleRequest) -> Result<StoredTuple> {
        debug!("Writing tuple to PostgreSQL: {}", request.key);

        let mut tx = self.begin().await?;
        let stored = Self::insert_in(&mut tx, request).await?;
        Self::commit(tx).await?;

        Ok(stored)
    }

    async fn find(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Vec<StoredTuple>> {
        let query = format!(
            "SELECT {TUPLE_COLUMNS} FROM relation_tuples \
             WHERE namespace = $1 AND object_id = $2 AND relation = $3 \
             ORDER BY created_at"
        );

        let rows = sqlx::query_as::<_, TupleRow>(&query)
            .bind(namespace)
            .bind(object_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to read tuples: {}", e)))?;

        debug!("Found {} tuples for {}:{}#{}", rows.len(), namespace, object_id, relation);
        Ok(rows.into_iter().map(StoredTuple::from).collect())
    }

    async fn find_by_subject(
        &self,
        subject_namespace: &str,
        subject_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<StoredTuple>> {
        let query = format!(
            "SELECT {TUPLE_COLUMNS} FROM relation_tuples \
             WHERE subject_namespace = $1 AND subject_id = $2 \
               AND ($3::TEXT IS NULL OR relation = $3) \
             ORDER BY created_at"
        );

        let rows = sqlx::query_as::<_, TupleRow>(&query)
            .bind(subject_namespace)
            .bind(subject_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Failed to read tuples by subject: {}", e)))?;

        Ok(rows.into_iter().map(StoredTuple::from).collect())
    }

    async fn delete(&self, key: &TupleKey) -> Result<bool> {
        debug!("Deleting tuple from PostgreSQL: {}", key);

        let mut tx = self.begin().await?;
        let deleted = Self::delete_in(&mut tx, key).await?;
        Self::commit(tx).await?;

        Ok(deleted)
    }

    async fn replace(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple> {
        debug!("Replacing tuple {} with {}", old, new.key);

        let mut tx = self.begin().await?;
        if !Self::delete_in(&mut tx, old).await? {
            // Dropping the transaction rolls it back
            return Err(ZanzibarError::Validation(format!(
                "Tuple to replace does not exist: {}",
                old
            )));
        }
        let stored = Self::insert_in(&mut tx, new).await?;
        Self::commit(tx).await?;

        Ok(stored)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ZanzibarError::Storage(format!("Health probe failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_normalizes_subject_relation() {
        let row = TupleRow {
            id: Uuid::new_v4(),
            namespace: "document".to_string(),
            object_id: "doc1".to_string(),
            relation: "viewer".to_string(),
            subject_namespace: "user".to_string(),
            subject_id: "alice".to_string(),
            subject_relation: String::new(),
            created_by: "owner".to_string(),
            created_at: Utc::now(),
        };

        let stored = StoredTuple::from(row);
        assert_eq!(stored.key.subject_relation, None);
        assert_eq!(subject_relation_column(&stored.key), "");
    }
}
