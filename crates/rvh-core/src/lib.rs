//! Core domain model for the review harvester.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "rvh-core";

/// Tag stamped on every stored review.
pub const SOURCE_TAG: &str = "Trustpilot";

/// A tracked business as seen in one catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub link: Option<String>,
}

impl Entity {
    /// Enabled with a listing link: the only shape that gets scraped.
    pub fn scrape_link(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.link.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Catalog document shape shared by the Postgres and YAML catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDocument {
    pub id: String,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub settings: BusinessSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSettings {
    #[serde(default)]
    pub review_platforms: ReviewPlatforms,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPlatforms {
    #[serde(default)]
    pub trustpilot: PlatformSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub link: Option<String>,
}

impl From<BusinessDocument> for Entity {
    fn from(doc: BusinessDocument) -> Self {
        let platform = doc.settings.review_platforms.trustpilot;
        Self {
            name: doc.business_name.unwrap_or_else(|| doc.id.clone()),
            id: doc.id,
            enabled: platform.enabled,
            link: platform.link,
        }
    }
}

/// Normalized, upsertable representation of one scraped review.
///
/// `id_review` is the upsert key; a later snapshot of the same id replaces
/// every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id_review: String,
    pub caption: String,
    pub relative_date: String,
    pub published_at: Option<DateTime<Utc>>,
    pub retrieval_date: DateTime<Utc>,
    pub rating: i32,
    pub username: String,
    pub n_review_user: i64,
    pub url_user: String,
    pub business_id: String,
    pub business_name: String,
    pub business_slug: String,
    pub business_url: String,
    pub scraped_at: DateTime<Utc>,
    pub review_url: String,
    pub source: String,
}
