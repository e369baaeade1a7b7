//! Aggregation service: on-demand computation, post-submission refresh, and
//! the offline full rebuild of the aggregate cache.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::Clock;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    AggregateCacheEntry, Aggregation, AggregationFilter, CacheDimensions, DimensionTuple,
    KeyScheme, RefreshRequest, fold_answer_groups, slugify_question_text,
};
use crate::domain::Error;
use crate::domain::ports::{
    AggregateCacheRepository, AggregateCacheRepositoryError, AnswerAggregationSource,
    AnswerAggregationSourceError, CacheRefreshMetrics, RefreshScope, SurveyRepository,
    SurveyRepositoryError, port_failure,
};
use crate::domain::survey::{Question, SizeBand, SurveyDefinition};

fn map_source_error(error: AnswerAggregationSourceError) -> Error {
    port_failure("answer source", &error)
}

pub(crate) fn map_cache_error(error: AggregateCacheRepositoryError) -> Error {
    port_failure("aggregate cache", &error)
}

pub(crate) fn map_survey_error(error: SurveyRepositoryError) -> Error {
    port_failure("survey repository", &error)
}

/// Outcome of a post-submission refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Entries recomputed and written.
    pub refreshed: usize,
    /// Entries left stale after a failure.
    pub failed: usize,
}

/// Outcome of a full cache rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub surveys: usize,
    pub questions: usize,
    pub entries: usize,
}

/// Computes distributions and keeps the aggregate cache in step with raw
/// answers.
#[derive(Clone)]
pub struct AggregationService<S, A, C, M> {
    surveys: Arc<S>,
    answers: Arc<A>,
    cache: Arc<C>,
    metrics: Arc<M>,
    clock: Arc<dyn Clock>,
}

impl<S, A, C, M> AggregationService<S, A, C, M> {
    /// Create a new aggregation service.
    pub fn new(
        surveys: Arc<S>,
        answers: Arc<A>,
        cache: Arc<C>,
        metrics: Arc<M>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            surveys,
            answers,
            cache,
            metrics,
            clock,
        }
    }
}

impl<S, A, C, M> AggregationService<S, A, C, M>
where
    S: SurveyRepository,
    A: AnswerAggregationSource,
    C: AggregateCacheRepository,
    M: CacheRefreshMetrics,
{
    /// Distribution for one question under `filter`, read from raw answers.
    pub async fn compute_aggregation(
        &self,
        question_id: Uuid,
        filter: &AggregationFilter,
    ) -> Result<Aggregation, Error> {
        let groups = self
            .answers
            .answer_groups(question_id, filter)
            .await
            .map_err(map_source_error)?;
        Ok(fold_answer_groups(&groups))
    }

    /// Cached distribution for a dimension tuple. A miss reads as zero
    /// responses.
    pub async fn cached_aggregation(&self, tuple: &DimensionTuple) -> Result<Aggregation, Error> {
        let entry = self
            .cache
            .find(&tuple.cache_key())
            .await
            .map_err(map_cache_error)?;
        Ok(entry.map_or_else(Aggregation::empty, |entry| entry.aggregation))
    }

    /// Cached distribution for `tuple`, computed from raw answers of
    /// `survey_id` when no entry exists yet. Nothing is written back.
    pub async fn cached_or_computed(
        &self,
        survey_id: Uuid,
        tuple: &DimensionTuple,
    ) -> Result<Aggregation, Error> {
        if let Some(entry) = self
            .cache
            .find(&tuple.cache_key())
            .await
            .map_err(map_cache_error)?
        {
            return Ok(entry.aggregation);
        }
        let filter = AggregationFilter {
            survey_id,
            sector: tuple.sector,
            period: tuple.period,
            size_band: tuple.size_band.clone(),
        };
        self.compute_aggregation(tuple.question_id, &filter).await
    }

    /// Recompute the sector-wide and size-band entries of every question in
    /// the submission's survey.
    ///
    /// A failing entry is logged and counted, and the remaining entries
    /// are still refreshed. Only a failure to load the survey itself is
    /// returned as an error.
    pub async fn refresh_cache_for_submission(
        &self,
        request: &RefreshRequest,
    ) -> Result<RefreshReport, Error> {
        let definition = match self.surveys.find_definition(request.survey_id).await {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                self.record_failed(RefreshScope::Job).await;
                return Err(Error::not_found(format!(
                    "survey {} not found",
                    request.survey_id
                )));
            }
            Err(error) => {
                self.record_failed(RefreshScope::Job).await;
                return Err(map_survey_error(error));
            }
        };

        let mut report = RefreshReport::default();
        for question in definition.questions() {
            let sector_wide = DimensionTuple {
                period: request.period,
                sector: request.sector,
                question_id: question.id,
                size_band: None,
            };
            let banded = DimensionTuple {
                size_band: Some(request.size_band.clone()),
                ..sector_wide.clone()
            };
            for (tuple, scope) in [
                (sector_wide, RefreshScope::SectorWide),
                (banded, RefreshScope::SizeBand),
            ] {
                match self.refresh_entry(request.survey_id, question, &tuple).await {
                    Ok(()) => {
                        report.refreshed += 1;
                        self.record_refreshed(scope).await;
                    }
                    Err(error) => {
                        report.failed += 1;
                        warn!(
                            survey_id = %request.survey_id,
                            question_id = %question.id,
                            cache_key = %tuple.cache_key(),
                            error = %error,
                            "aggregate cache entry left stale"
                        );
                        self.record_failed(scope).await;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn refresh_entry(
        &self,
        survey_id: Uuid,
        question: &Question,
        tuple: &DimensionTuple,
    ) -> Result<(), Error> {
        let filter = AggregationFilter {
            survey_id,
            sector: tuple.sector,
            period: tuple.period,
            size_band: tuple.size_band.clone(),
        };
        let aggregation = self.compute_aggregation(question.id, &filter).await?;
        let entry = AggregateCacheEntry {
            key: tuple.cache_key(),
            dimensions: CacheDimensions::describe(tuple, &question.text, KeyScheme::Dimension),
            aggregation,
            computed_at: self.clock.utc(),
        };
        self.cache.upsert(&entry).await.map_err(map_cache_error)
    }

    /// Recompute the whole cache from raw answers for every active survey.
    ///
    /// Each question gets a sector-wide entry and one entry per size band
    /// present in the survey's submissions, under both key schemes. The
    /// cache is replaced in one step; on error the previous contents stay.
    pub async fn rebuild_cache(&self) -> Result<RebuildReport, Error> {
        let definitions = self
            .surveys
            .list_active_definitions()
            .await
            .map_err(map_survey_error)?;

        let mut entries = Vec::new();
        let mut report = RebuildReport::default();
        for definition in &definitions {
            let bands = self
                .answers
                .distinct_size_bands(definition.survey().id)
                .await
                .map_err(map_source_error)?;
            report.questions += self
                .rebuild_survey(definition, &bands, &mut entries)
                .await?;
            report.surveys += 1;
        }

        report.entries = self
            .cache
            .replace_all(&entries)
            .await
            .map_err(map_cache_error)?;
        info!(
            surveys = report.surveys,
            questions = report.questions,
            entries = report.entries,
            "aggregate cache rebuilt"
        );
        Ok(report)
    }

    async fn rebuild_survey(
        &self,
        definition: &SurveyDefinition,
        bands: &[SizeBand],
        entries: &mut Vec<AggregateCacheEntry>,
    ) -> Result<usize, Error> {
        let survey = definition.survey();
        let computed_at = self.clock.utc();
        let mut slugs = SlugRegistry::default();
        let mut questions = 0;

        for question in definition.questions() {
            let slug = slugs.claim(&question.text);
            let sector_wide = DimensionTuple {
                period: survey.period,
                sector: survey.sector,
                question_id: question.id,
                size_band: None,
            };
            let tuples = std::iter::once(sector_wide.clone()).chain(bands.iter().map(|band| {
                DimensionTuple {
                    size_band: Some(band.clone()),
                    ..sector_wide.clone()
                }
            }));

            for tuple in tuples {
                let filter = AggregationFilter {
                    survey_id: survey.id,
                    sector: survey.sector,
                    period: survey.period,
                    size_band: tuple.size_band.clone(),
                };
                let aggregation = self.compute_aggregation(question.id, &filter).await?;
                entries.push(AggregateCacheEntry {
                    key: tuple.descriptive_key(&slug),
                    dimensions: CacheDimensions::describe(
                        &tuple,
                        &question.text,
                        KeyScheme::Descriptive,
                    ),
                    aggregation: aggregation.clone(),
                    computed_at,
                });
                entries.push(AggregateCacheEntry {
                    key: tuple.cache_key(),
                    dimensions: CacheDimensions::describe(
                        &tuple,
                        &question.text,
                        KeyScheme::Dimension,
                    ),
                    aggregation,
                    computed_at,
                });
            }
            questions += 1;
        }

        Ok(questions)
    }

    async fn record_refreshed(&self, scope: RefreshScope) {
        if let Err(error) = self.metrics.record_refreshed(scope).await {
            warn!(error = %error, "failed to record cache refresh metric");
        }
    }

    async fn record_failed(&self, scope: RefreshScope) {
        if let Err(error) = self.metrics.record_failed(scope).await {
            warn!(error = %error, "failed to record cache refresh metric");
        }
    }
}

/// Hands out unique slugs within one survey; repeats get `~2`, `~3`, ...
#[derive(Default)]
struct SlugRegistry {
    seen: HashMap<String, usize>,
}

impl SlugRegistry {
    fn claim(&mut self, text: &str) -> String {
        let base = slugify_question_text(text);
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}~{count}")
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
