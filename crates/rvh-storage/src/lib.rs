//! Page fetch transport, catalog readers and review sinks for the harvester.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rvh_core::{BusinessDocument, BusinessSettings, Entity, ReviewRecord};
use serde_yaml::Value as YamlValue;
pub use sqlx::postgres::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::Row;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, debug_span, Instrument};

pub const CRATE_NAME: &str = "rvh-storage";

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Pause after every successful response before handing the body back.
    pub post_fetch_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: "Mozilla/5.0".to_string(),
            post_fetch_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-shot page transport. A failure is terminal for that request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    post_fetch_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            post_fetch_delay: config.post_fetch_delay,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let span = debug_span!("page_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }

            let body = resp.text().await?;
            debug!(bytes = body.len(), "page fetched");
            if !self.post_fetch_delay.is_zero() {
                tokio::time::sleep(self.post_fetch_delay).await;
            }
            Ok(body)
        }
        .instrument(span)
        .await
    }
}

/// Read side of the business catalog. Every call must reflect the latest
/// committed configuration.
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    async fn list_entities(&self) -> anyhow::Result<Vec<Entity>>;

    async fn find_entity(&self, id: &str) -> anyhow::Result<Option<Entity>> {
        Ok(self
            .list_entities()
            .await?
            .into_iter()
            .find(|entity| entity.id == id))
    }
}

#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn entity_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<Entity> {
        let id: String = row.try_get("id").context("reading businesses.id")?;
        let business_name: Option<String> = row
            .try_get("business_name")
            .context("reading businesses.business_name")?;
        let Json(settings): Json<BusinessSettings> = row
            .try_get("settings")
            .with_context(|| format!("decoding settings for business {id}"))?;
        Ok(Entity::from(BusinessDocument {
            id,
            business_name,
            settings,
        }))
    }
}

#[async_trait]
impl EntityCatalog for PgCatalog {
    async fn list_entities(&self) -> anyhow::Result<Vec<Entity>> {
        let rows = sqlx::query("SELECT id, business_name, settings FROM businesses ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("listing businesses")?;
        rows.iter().map(Self::entity_from_row).collect()
    }

    async fn find_entity(&self, id: &str) -> anyhow::Result<Option<Entity>> {
        let row = sqlx::query("SELECT id, business_name, settings FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("reading business {id}"))?;
        row.as_ref().map(Self::entity_from_row).transpose()
    }
}

/// File-backed catalog; the file is re-read on every call so edits take
/// effect on the next tick.
#[derive(Debug, Clone)]
pub struct YamlCatalog {
    path: PathBuf,
}

impl YamlCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<Vec<BusinessDocument>> {
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let value: YamlValue = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        let Some(businesses) = value.get("businesses") else {
            return Ok(Vec::new());
        };
        serde_yaml::from_value(businesses.clone())
            .with_context(|| format!("decoding businesses in {}", self.path.display()))
    }
}

#[async_trait]
impl EntityCatalog for YamlCatalog {
    async fn list_entities(&self) -> anyhow::Result<Vec<Entity>> {
        Ok(self.load().await?.into_iter().map(Entity::from).collect())
    }
}

/// Durable review store keyed by review id. Repeated upserts of the same id
/// replace the stored fields with the latest snapshot.
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn upsert(&self, record: &ReviewRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgReviewSink {
    pool: PgPool,
}

impl PgReviewSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewSink for PgReviewSink {
    async fn upsert(&self, record: &ReviewRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (
                id_review, caption, relative_date, published_at, retrieval_date, rating,
                username, n_review_user, url_user, business_id, business_name, business_slug,
                business_url, scraped_at, review_url, source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id_review) DO UPDATE SET
                caption = EXCLUDED.caption,
                relative_date = EXCLUDED.relative_date,
                published_at = EXCLUDED.published_at,
                retrieval_date = EXCLUDED.retrieval_date,
                rating = EXCLUDED.rating,
                username = EXCLUDED.username,
                n_review_user = EXCLUDED.n_review_user,
                url_user = EXCLUDED.url_user,
                business_id = EXCLUDED.business_id,
                business_name = EXCLUDED.business_name,
                business_slug = EXCLUDED.business_slug,
                business_url = EXCLUDED.business_url,
                scraped_at = EXCLUDED.scraped_at,
                review_url = EXCLUDED.review_url,
                source = EXCLUDED.source
            "#,
        )
        .bind(&record.id_review)
        .bind(&record.caption)
        .bind(&record.relative_date)
        .bind(record.published_at)
        .bind(record.retrieval_date)
        .bind(record.rating)
        .bind(&record.username)
        .bind(record.n_review_user)
        .bind(&record.url_user)
        .bind(&record.business_id)
        .bind(&record.business_name)
        .bind(&record.business_slug)
        .bind(&record.business_url)
        .bind(record.scraped_at)
        .bind(&record.review_url)
        .bind(&record.source)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upserting review {}", record.id_review))?;
        Ok(())
    }
}

/// In-process sink for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryReviewSink {
    rows: Mutex<HashMap<String, ReviewRecord>>,
    upserts: AtomicUsize,
}

impl MemoryReviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id_review: &str) -> Option<ReviewRecord> {
        self.rows.lock().await.get(id_review).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Total upsert calls, including ones that replaced an existing row.
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewSink for MemoryReviewSink {
    async fn upsert(&self, record: &ReviewRecord) -> anyhow::Result<()> {
        self.rows
            .lock()
            .await
            .insert(record.id_review.clone(), record.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("connecting to postgres")
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    MIGRATOR.run(pool).await.context("running migrations")
}
