//! Review extraction from listing pages that embed their data in a
//! `__NEXT_DATA__` script block.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "rvh-adapters";

const NEXT_DATA_SELECTOR: &str = "script#__NEXT_DATA__";
const REVIEWS_POINTER: &str = "/props/pageProps/reviews";

/// One review as the listing site serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReview {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub dates: SourceDates,
    pub consumer: SourceConsumer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDates {
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_date_relative: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConsumer {
    pub display_name: String,
    #[serde(default)]
    pub number_of_reviews: Option<i64>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

/// Every variant ends pagination for the current walk exactly like an empty
/// page would.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page has no __NEXT_DATA__ block")]
    MissingDataBlock,
    #[error("malformed structured data: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("structured data has no reviews at /props/pageProps/reviews")]
    MissingReviews,
    #[error("{0}")]
    Selector(String),
}

pub trait ReviewExtractor: Send + Sync {
    fn extract(&self, body: &str) -> Result<Vec<SourceReview>, ExtractError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NextDataExtractor;

impl NextDataExtractor {
    fn data_block(body: &str) -> Result<String, ExtractError> {
        let document = Html::parse_document(body);
        let sel =
            Selector::parse(NEXT_DATA_SELECTOR).map_err(|e| ExtractError::Selector(e.to_string()))?;
        document
            .select(&sel)
            .next()
            .map(|n| n.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .ok_or(ExtractError::MissingDataBlock)
    }
}

impl ReviewExtractor for NextDataExtractor {
    fn extract(&self, body: &str) -> Result<Vec<SourceReview>, ExtractError> {
        let raw = Self::data_block(body)?;
        let data: JsonValue = serde_json::from_str(&raw)?;
        let reviews = data
            .pointer(REVIEWS_POINTER)
            .filter(|v| !v.is_null())
            .ok_or(ExtractError::MissingReviews)?;
        Ok(serde_json::from_value(reviews.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with(data: &str) -> String {
        format!(
            r#"<html><head><title>Reviews</title></head><body>
<div id="__next"></div>
<script id="__NEXT_DATA__" type="application/json">{data}</script>
</body></html>"#
        )
    }

    #[test]
    fn extracts_reviews_at_known_path() {
        let body = page_with(
            r#"{"props":{"pageProps":{"reviews":[
                {"id":"rv1","text":"Great bread","rating":5,
                 "dates":{"publishedDate":"2026-02-20T09:30:00.000Z","publishedDateRelative":"4 days ago"},
                 "consumer":{"displayName":"Ann","numberOfReviews":3,"profileUrl":"/users/ann"}},
                {"id":"rv2","rating":2,"consumer":{"displayName":"Bob"}}
            ]}}}"#,
        );

        let reviews = NextDataExtractor.extract(&body).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].id, "rv1");
        assert_eq!(reviews[0].text.as_deref(), Some("Great bread"));
        assert_eq!(
            reviews[0].dates.published_date_relative.as_deref(),
            Some("4 days ago")
        );
        assert!(reviews[0].dates.published_date.is_some());
        assert_eq!(reviews[0].consumer.number_of_reviews, Some(3));
        assert_eq!(reviews[1].text, None);
        assert_eq!(reviews[1].consumer.profile_url, None);
    }

    #[test]
    fn empty_review_list_is_not_an_error() {
        let body = page_with(r#"{"props":{"pageProps":{"reviews":[]}}}"#);
        assert!(NextDataExtractor.extract(&body).unwrap().is_empty());
    }

    #[test]
    fn missing_block_is_reported() {
        let err = NextDataExtractor
            .extract("<html><body><p>captcha</p></body></html>")
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingDataBlock));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = NextDataExtractor
            .extract(&page_with("{not json"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Malformed(_)));
    }

    #[test]
    fn missing_path_is_reported() {
        let err = NextDataExtractor
            .extract(&page_with(r#"{"props":{"pageProps":{}}}"#))
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingReviews));
    }

    #[test]
    fn review_without_required_fields_fails_the_page() {
        let err = NextDataExtractor
            .extract(&page_with(
                r#"{"props":{"pageProps":{"reviews":[{"id":"rv1","rating":4}]}}}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Malformed(_)));
    }
}
