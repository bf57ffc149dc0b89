//! Idea persistence
//!
//! The production [`RecordSink`]: one INSERT per row. Slugs are unique, so a
//! re-imported row surfaces as a conflict rather than a duplicate.

use crate::models::{CreateIdea, RecordRef};
use crate::services::record_sink::{RecordSink, SinkError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SqliteIdeaStore {
    pool: SqlitePool,
}

impl SqliteIdeaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM ideas")
            .fetch_one(&self.pool)
            .await
    }

    /// Id of the idea with `slug`, if stored
    pub async fn find_id_by_slug(&self, slug: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM ideas WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }
}

#[async_trait]
impl RecordSink for SqliteIdeaStore {
    async fn create(&self, command: &CreateIdea) -> Result<RecordRef, SinkError> {
        // Prepare everything before touching the pool
        let id = Uuid::new_v4().to_string();
        let tags = serde_json::to_string(&command.tags)
            .map_err(|e| SinkError::Rejected(format!("tags not serializable: {}", e)))?;
        let metadata = command.metadata.as_ref().map(|m| m.to_string());
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO ideas (
                id, title, description, slug, category, tags,
                target_market, revenue_model, market_size, difficulty,
                featured, metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&command.title)
        .bind(&command.description)
        .bind(&command.slug)
        .bind(&command.category)
        .bind(&tags)
        .bind(&command.target_market)
        .bind(&command.revenue_model)
        .bind(command.market_size)
        .bind(command.difficulty.map(i64::from))
        .bind(command.featured)
        .bind(&metadata)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, &command.slug))?;

        Ok(RecordRef {
            id,
            slug: command.slug.clone(),
        })
    }
}

/// Map a sqlx failure onto the sink's retry classes
fn classify(err: sqlx::Error, slug: &str) -> SinkError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            SinkError::Conflict(format!("an idea with slug '{}' already exists", slug))
        }
        sqlx::Error::Database(db) if db.message().contains("database is locked") => {
            SinkError::Transient(err.to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SinkError::Transient(err.to_string())
        }
        _ => SinkError::Rejected(err.to_string()),
    }
}
