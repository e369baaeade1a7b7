//! Aggregate cache keys and entries.
//!
//! Two key schemes share one table. Dimension keys (`dim:` prefix) are
//! written by every refresh and rebuild. Descriptive keys (`txt:` prefix)
//! embed slugified question text for operators browsing the table and are
//! written only by a full rebuild. Components are escaped so that distinct
//! dimension tuples always produce distinct keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Aggregation;
use crate::domain::survey::{Sector, SizeBand, SurveyPeriod};

const DELIMITER: char = ':';
const SLUG_MAX_CHARS: usize = 80;

/// Which naming scheme produced a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    Dimension,
    Descriptive,
}

impl KeyScheme {
    fn prefix(self) -> &'static str {
        match self {
            Self::Dimension => "dim",
            Self::Descriptive => "txt",
        }
    }
}

/// Unique identifier of an aggregate cache row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateCacheKey(String);

impl AggregateCacheKey {
    /// Wrap a key read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn build<'a>(scheme: KeyScheme, parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut key = String::from(scheme.prefix());
        for part in parts {
            key.push(DELIMITER);
            escape_into(&mut key, part);
        }
        Self(key)
    }
}

impl fmt::Display for AggregateCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for AggregateCacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

fn escape_into(out: &mut String, part: &str) {
    for ch in part.chars() {
        match ch {
            '%' => out.push_str("%25"),
            DELIMITER => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

/// The (year, quarter, sector, question, optional size band) tuple a cache
/// entry describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionTuple {
    pub period: SurveyPeriod,
    pub sector: Sector,
    pub question_id: Uuid,
    pub size_band: Option<SizeBand>,
}

impl DimensionTuple {
    /// Key under the dimension scheme.
    ///
    /// # Examples
    /// ```
    /// use survey_backend::domain::{DimensionTuple, Sector, SizeBand, SurveyPeriod};
    /// use uuid::Uuid;
    ///
    /// let tuple = DimensionTuple {
    ///     period: SurveyPeriod::new(2025, 2).unwrap(),
    ///     sector: Sector::Refiners,
    ///     question_id: Uuid::nil(),
    ///     size_band: Some(SizeBand::new("50-249").unwrap()),
    /// };
    /// assert_eq!(
    ///     tuple.cache_key().as_str(),
    ///     "dim:2025:Q2:refiners:00000000-0000-0000-0000-000000000000:50-249"
    /// );
    /// ```
    pub fn cache_key(&self) -> AggregateCacheKey {
        let question = self.question_id.to_string();
        self.key_with(KeyScheme::Dimension, &question)
    }

    /// Key under the descriptive scheme using a question slug.
    pub fn descriptive_key(&self, slug: &str) -> AggregateCacheKey {
        self.key_with(KeyScheme::Descriptive, slug)
    }

    fn key_with(&self, scheme: KeyScheme, subject: &str) -> AggregateCacheKey {
        let year = self.period.year().to_string();
        let quarter = format!("Q{}", self.period.quarter());
        let mut parts = vec![year.as_str(), quarter.as_str(), self.sector.as_str(), subject];
        if let Some(band) = &self.size_band {
            parts.push(band.as_str());
        }
        AggregateCacheKey::build(scheme, parts)
    }

    /// Same tuple without the size band.
    pub fn sector_wide(&self) -> Self {
        Self {
            size_band: None,
            ..self.clone()
        }
    }
}

/// Denormalised description of a cache entry stored alongside its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDimensions {
    pub year: i32,
    pub quarter: u8,
    pub sector: Sector,
    pub question_id: Uuid,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_band: Option<SizeBand>,
    pub scheme: KeyScheme,
}

impl CacheDimensions {
    /// Describe `tuple` for display.
    pub fn describe(tuple: &DimensionTuple, question_text: &str, scheme: KeyScheme) -> Self {
        Self {
            year: tuple.period.year(),
            quarter: tuple.period.quarter(),
            sector: tuple.sector,
            question_id: tuple.question_id,
            question_text: question_text.to_owned(),
            size_band: tuple.size_band.clone(),
            scheme,
        }
    }
}

/// One precomputed cache row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCacheEntry {
    pub key: AggregateCacheKey,
    pub dimensions: CacheDimensions,
    pub aggregation: Aggregation,
    pub computed_at: DateTime<Utc>,
}

/// Reduce question text to a short key-safe slug.
///
/// Drops everything but ASCII letters, digits and whitespace, keeps at most
/// 80 characters, joins words with `_`, and lowercases. Text with nothing
/// left yields `question`.
///
/// # Examples
/// ```
/// use survey_backend::domain::slugify_question_text;
///
/// assert_eq!(
///     slugify_question_text("What % of sales were gold (by value)?"),
///     "what_of_sales_were_gold_by_value"
/// );
/// ```
pub fn slugify_question_text(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace())
        .collect();
    let truncated: String = kept.trim().chars().take(SLUG_MAX_CHARS).collect();
    let slug = truncated
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_ascii_lowercase();
    if slug.is_empty() {
        "question".to_owned()
    } else {
        slug
    }
}
