//! Per-question distribution counts and the derived aggregate cache.
//!
//! Raw answers are grouped by their stored representation upstream; this
//! module folds those groups into a label-to-count mapping. The fold is
//! pure, so recomputing the same groups always yields the same result.

mod cache_key;
mod service;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::survey::{Sector, SizeBand, SurveyPeriod};

pub use cache_key::{
    AggregateCacheEntry, AggregateCacheKey, CacheDimensions, DimensionTuple, KeyScheme,
    slugify_question_text,
};
pub(crate) use service::{map_cache_error, map_survey_error};
pub use service::{AggregationService, RebuildReport, RefreshReport};

/// Exact-match filter over submissions for one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationFilter {
    pub survey_id: Uuid,
    pub sector: Sector,
    pub period: SurveyPeriod,
    /// `None` aggregates sector-wide.
    pub size_band: Option<SizeBand>,
}

/// Dimensions of a submission that needs its cache entries refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub survey_id: Uuid,
    pub sector: Sector,
    pub period: SurveyPeriod,
    pub size_band: SizeBand,
}

/// Answer rows sharing one raw representation.
///
/// `value` holds the scalar column and `values` the JSON text of the complex
/// column, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerGroup {
    pub value: Option<String>,
    pub values: Option<String>,
    /// Number of answer rows in the group.
    pub row_count: u64,
    /// Distinct submissions contributing a row to the group.
    pub submission_ids: Vec<Uuid>,
}

/// Distribution for one question under one dimension tuple.
///
/// ## Invariants
/// - `response_count` is the number of distinct submissions behind `result`.
/// - Multi-choice sums may exceed `response_count`; percentage splits hold
///   count-weighted sums of shares, not averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub result: BTreeMap<String, f64>,
    pub response_count: u64,
}

impl Aggregation {
    /// Aggregation with no contributing responses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Average share for a percentage-split key.
    ///
    /// Returns `None` when there are no responses or the key is absent.
    pub fn mean_share(&self, key: &str) -> Option<f64> {
        if self.response_count == 0 {
            return None;
        }
        self.result
            .get(key)
            .map(|sum| sum / self.response_count as f64)
    }
}

enum Parsed {
    Scalar(String),
    Members(Vec<String>),
    Weighted(Vec<(String, f64)>),
}

fn parse_group(group: &AnswerGroup) -> Option<Parsed> {
    match (&group.value, &group.values) {
        (Some(value), None) if !value.is_empty() => Some(Parsed::Scalar(value.clone())),
        (None, Some(raw)) => parse_complex(raw),
        _ => None,
    }
}

fn parse_complex(raw: &str) -> Option<Parsed> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(member) => Some(member),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Parsed::Members),
        Value::Object(shares) => shares
            .into_iter()
            .map(|(key, share)| share_value(&share).map(|number| (key, number)))
            .collect::<Option<Vec<_>>>()
            .map(Parsed::Weighted),
        _ => None,
    }
}

fn share_value(share: &Value) -> Option<f64> {
    match share {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
}

/// Fold grouped answer rows into a distribution.
///
/// Malformed groups are skipped and contribute to neither the result nor
/// the response count.
///
/// # Examples
/// ```
/// use survey_backend::domain::{AnswerGroup, fold_answer_groups};
/// use uuid::Uuid;
///
/// let group = AnswerGroup {
///     value: None,
///     values: Some(r#"["gold","silver"]"#.into()),
///     row_count: 2,
///     submission_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
/// };
/// let aggregation = fold_answer_groups(&[group]);
/// assert_eq!(aggregation.result.get("gold"), Some(&2.0));
/// assert_eq!(aggregation.response_count, 2);
/// ```
pub fn fold_answer_groups(groups: &[AnswerGroup]) -> Aggregation {
    let mut result: BTreeMap<String, f64> = BTreeMap::new();
    let mut contributors: BTreeSet<Uuid> = BTreeSet::new();

    for group in groups {
        let Some(parsed) = parse_group(group) else {
            debug!(rows = group.row_count, "skipping malformed answer group");
            continue;
        };
        let weight = group.row_count as f64;
        match parsed {
            Parsed::Scalar(value) => *result.entry(value).or_default() += weight,
            Parsed::Members(members) => {
                for member in members {
                    *result.entry(member).or_default() += weight;
                }
            }
            Parsed::Weighted(shares) => {
                for (key, share) in shares {
                    *result.entry(key).or_default() += share * weight;
                }
            }
        }
        contributors.extend(group.submission_ids.iter().copied());
    }

    Aggregation {
        result,
        response_count: contributors.len() as u64,
    }
}
