//! Profile persistence layer
//!
//! Fire-and-forget from the orchestrator's perspective: save failures
//! are logged, never surfaced to the conversation. Backed by Postgres
//! when a database URL is configured, in-memory otherwise.

use crate::error::AdvisorError;
use crate::models::AnalysisRecord;
use crate::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

/// Trait for persisting finalized analysis records
#[async_trait]
pub trait ProfileSink: Send + Sync {
    async fn save(&self, record: &AnalysisRecord) -> Result<()>;
    async fn load(&self, user_id: &str) -> Result<Option<AnalysisRecord>>;
}

/// Derive a stable record UUID from a transport user-id string, so
/// repeated analyses for the same user upsert the same row.
pub fn stable_record_id(user_id: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(user_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// In-memory profile sink for development
pub struct InMemoryProfileSink {
    records: Arc<RwLock<HashMap<String, AnalysisRecord>>>,
}

impl InMemoryProfileSink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryProfileSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileSink for InMemoryProfileSink {
    async fn save(&self, record: &AnalysisRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }
}

/// Postgres-backed profile sink with lazy pool and idempotent schema.
pub struct PostgresProfileSink {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresProfileSink {
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| {
                AdvisorError::Persistence(format!("Failed to configure postgres pool: {}", e))
            })?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS client_profiles (
                      record_id UUID PRIMARY KEY,
                      user_id TEXT NOT NULL,
                      record JSONB NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AdvisorError::Persistence(format!(
                    "Failed to initialize profile schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait]
impl ProfileSink for PostgresProfileSink {
    async fn save(&self, record: &AnalysisRecord) -> Result<()> {
        self.ensure_schema().await?;

        let payload = serde_json::to_value(record)?;

        sqlx::query(
            r#"
            INSERT INTO client_profiles (record_id, user_id, record, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (record_id)
            DO UPDATE SET record = EXCLUDED.record, updated_at = NOW();
            "#,
        )
        .bind(record.record_id)
        .bind(&record.user_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AdvisorError::Persistence(format!("Failed to save profile: {}", e)))?;

        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        self.ensure_schema().await?;

        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT record FROM client_profiles WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AdvisorError::Persistence(format!("Failed to load profile: {}", e)))?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }
}

/// Choose the sink from the environment: Postgres when a database URL
/// is set, in-memory otherwise.
pub fn build_profile_sink() -> Arc<dyn ProfileSink> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match PostgresProfileSink::connect_lazy(&url) {
            Ok(sink) => {
                tracing::info!("Profile sink backend: postgres");
                return Arc::new(sink);
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to initialize postgres profile sink, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    tracing::info!("Profile sink backend: in-memory");
    Arc::new(InMemoryProfileSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::analyze_gap;
    use crate::models::{
        Gender, PolicyType, Profile, DEFAULT_ANNUAL_INCOME, DEFAULT_DEBT, DEFAULT_DEPENDENT_COST,
    };
    use chrono::Utc;

    fn test_record(user_id: &str) -> AnalysisRecord {
        let profile = Profile {
            policy_type: PolicyType::Protection,
            monthly_budget: 3000,
            age: 30,
            gender: Gender::Male,
            occupation_class: 2,
            product_reference: "http://example.test/policy".to_string(),
            annual_income: DEFAULT_ANNUAL_INCOME,
            debt: DEFAULT_DEBT,
            dependent_cost: DEFAULT_DEPENDENT_COST,
        };
        let gap = analyze_gap(&profile, &[]);

        AnalysisRecord {
            record_id: stable_record_id(user_id),
            user_id: user_id.to_string(),
            profile,
            product_reference: "http://example.test/policy".to_string(),
            document_title: "安心終身壽險".to_string(),
            gap,
            irr: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stable_record_id_is_deterministic() {
        let a = stable_record_id("line-user-1");
        let b = stable_record_id("line-user-1");
        let c = stable_record_id("line-user-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[tokio::test]
    async fn in_memory_sink_round_trip() {
        let sink = InMemoryProfileSink::new();
        let record = test_record("line-user-1");

        sink.save(&record).await.unwrap();

        let loaded = sink.load("line-user-1").await.unwrap().unwrap();
        assert_eq!(loaded.record_id, record.record_id);
        assert_eq!(loaded.document_title, "安心終身壽險");

        assert!(sink.load("line-user-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_twice_overwrites() {
        let sink = InMemoryProfileSink::new();
        let mut record = test_record("line-user-1");
        sink.save(&record).await.unwrap();

        record.document_title = "新版保單".to_string();
        sink.save(&record).await.unwrap();

        let loaded = sink.load("line-user-1").await.unwrap().unwrap();
        assert_eq!(loaded.document_title, "新版保單");
    }
}
