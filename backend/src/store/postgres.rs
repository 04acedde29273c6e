// Postgres record store - one JSONB document table for every collection

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crewboard_shared::{collections, Escalation};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{prepare_record, Filter, Patch, Query, Record, RecordStore, SortDirection};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
        match filter {
            Filter::Eq(field, value) => {
                builder.push(" AND data -> ");
                builder.push_bind(field.clone());
                builder.push(" = ");
                builder.push_bind(value.clone());
            }
            Filter::Ne(field, value) => {
                builder.push(" AND (data -> ");
                builder.push_bind(field.clone());
                builder.push(") IS DISTINCT FROM ");
                builder.push_bind(value.clone());
            }
            Filter::ArrayContains(field, value) => {
                builder.push(" AND data -> ");
                builder.push_bind(field.clone());
                builder.push(" @> ");
                builder.push_bind(Value::Array(vec![value.clone()]));
            }
        }
    }
}

fn created_at_of(record: &Record) -> Option<DateTime<Utc>> {
    record
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
}

#[async_trait]
impl RecordStore for PgStore {
    async fn list(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT data FROM records WHERE collection = ");
        builder.push_bind(collection.to_string());

        for filter in &query.filters {
            Self::push_filter(&mut builder, filter);
        }

        builder.push(" ORDER BY ");
        if let Some((field, direction)) = &query.order_by {
            builder.push("data -> ");
            builder.push_bind(field.clone());
            builder.push(match direction {
                SortDirection::Ascending => " ASC NULLS LAST, ",
                SortDirection::Descending => " DESC NULLS LAST, ",
            });
        }
        builder.push("created_at ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows: Vec<(Value,)> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(data,)| data).collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Record>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT data FROM records WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(data,)| data))
    }

    async fn insert(&self, collection: &str, record: Record) -> StoreResult<Record> {
        let (id, record) = prepare_record(record)?;

        sqlx::query(
            r#"
            INSERT INTO records (collection, id, data, created_at)
            VALUES ($1, $2, $3, COALESCE($4, NOW()))
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&record)
        .bind(created_at_of(&record))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update(&self, collection: &str, id: Uuid, mut patch: Patch) -> StoreResult<Record> {
        patch.remove("id");

        let row: Option<(Value,)> = sqlx::query_as(
            r#"
            UPDATE records
            SET data = data || $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(patch))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data,)| data)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn insert_escalation_if_absent(
        &self,
        escalation: &Escalation,
        window: Duration,
    ) -> StoreResult<bool> {
        let task_id = escalation.task_id.to_string();
        let cutoff = escalation
            .created_at
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut tx = self.pool.begin().await?;

        // Serialize concurrent scans on the same (task, rule) pair.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", task_id, escalation.rule_id))
            .execute(&mut *tx)
            .await?;

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM records
                WHERE collection = $1
                  AND data ->> 'task_id' = $2
                  AND data ->> 'rule_id' = $3
                  AND created_at > $4
            )
            "#,
        )
        .bind(collections::ESCALATIONS)
        .bind(&task_id)
        .bind(&escalation.rule_id)
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await?;

        if exists {
            tx.rollback().await?;
            debug!(task_id = %task_id, rule_id = %escalation.rule_id, "Escalation within cooldown");
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO records (collection, id, data, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(collections::ESCALATIONS)
        .bind(escalation.id)
        .bind(serde_json::to_value(escalation)?)
        .bind(escalation.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
