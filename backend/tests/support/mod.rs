//! In-memory port implementations and survey builders for behaviour tests.
//!
//! `InMemoryStore` stands in for every PostgreSQL adapter so the domain
//! services can be driven end to end without a database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use mockable::DefaultClock;
use survey_backend::domain::ports::{
    AggregateCacheRepository, AggregateCacheRepositoryError, AnswerAggregationSource,
    AnswerAggregationSourceError, CacheRefreshQueue, CacheRefreshQueueError, DataResetAudit,
    DataResetRepository, DataResetRepositoryError, DeletedCounts, NewSubmission, PeriodCount,
    NoOpCacheRefreshMetrics, SubmissionCountFilter, SubmissionCounts, SubmissionRecord,
    SubmissionRepository, SubmissionRepositoryError, SubmissionStatsQuery,
    SubmissionStatsQueryError, SurveyRepository, SurveyRepositoryError,
};
use survey_backend::domain::{
    AggregateCacheEntry, AggregateCacheKey, AggregationFilter, AggregationService, AnswerGroup,
    AnswerSet, AnswerValue, BranchingRule, Condition, ConditionOperator, KAnonymityEnv,
    KAnonymityGuard, Pillar, Question, QuestionMetadata, QuestionOption, QuestionType,
    RefreshRequest, ReportingService, RuleAction, Sector, SizeBand, StoredAnswer,
    SubmissionPayload, SubmissionService, SubmittedAnswer, Survey, SurveyDefinition, SurveyPeriod,
    SurveySection, verify_receipt_code,
};
use uuid::Uuid;

/// Threshold source with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct FixedThreshold(pub u64);

impl KAnonymityEnv for FixedThreshold {
    fn string(&self, _name: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

/// Question ids of the retail survey used across scenarios.
#[derive(Debug, Clone)]
pub struct RetailSurvey {
    pub definition: SurveyDefinition,
    pub metal: Uuid,
    pub mix: Uuid,
    pub products: Uuid,
}

impl RetailSurvey {
    pub fn survey_id(&self) -> Uuid {
        self.definition.survey().id
    }

    pub fn period(&self) -> SurveyPeriod {
        self.definition.survey().period
    }
}

fn choice_options(values: &[&str]) -> Vec<QuestionOption> {
    values
        .iter()
        .map(|value| QuestionOption {
            value: (*value).to_owned(),
            label: value.to_uppercase(),
        })
        .collect()
}

/// Retail survey for 2025 Q2. Answering `none` to the main metal question
/// skips the products section.
pub fn retail_survey() -> RetailSurvey {
    let survey = Survey {
        id: Uuid::new_v4(),
        title: "Retail pulse 2025 Q2".to_owned(),
        sector: Sector::Retailers,
        period: SurveyPeriod::new(2025, 2).expect("valid period"),
        is_active: true,
    };
    let context_id = Uuid::new_v4();
    let products_id = Uuid::new_v4();

    let metal = Question {
        id: Uuid::new_v4(),
        section_id: context_id,
        text: "Which metal sells most?".to_owned(),
        question_type: QuestionType::SingleChoice,
        options: choice_options(&["gold", "silver", "none"]),
        is_required: true,
        sort_order: 1,
        metadata: QuestionMetadata::default(),
    };
    let mix = Question {
        id: Uuid::new_v4(),
        section_id: context_id,
        text: "Split of sales by metal (%)".to_owned(),
        question_type: QuestionType::PercentageSplit,
        options: choice_options(&["gold", "silver"]),
        is_required: false,
        sort_order: 2,
        metadata: QuestionMetadata {
            max_selections: None,
            total_must_equal_100: true,
        },
    };
    let products = Question {
        id: Uuid::new_v4(),
        section_id: products_id,
        text: "Which products do you stock?".to_owned(),
        question_type: QuestionType::MultiChoice,
        options: choice_options(&["rings", "chains", "watches"]),
        is_required: true,
        sort_order: 1,
        metadata: QuestionMetadata::default(),
    };
    let ids = (metal.id, mix.id, products.id);

    let rule = BranchingRule {
        id: Uuid::new_v4(),
        sequence: 1,
        source_question_id: metal.id,
        condition: Condition {
            operator: ConditionOperator::Equals,
            value: "none".to_owned(),
        },
        action: RuleAction::SkipSection(products_id),
        explanation: Some("Only asked of metal sellers".to_owned()),
    };
    let sections = vec![
        SurveySection {
            id: context_id,
            survey_id: survey.id,
            title: "Context".to_owned(),
            description: None,
            sort_order: 1,
            pillar: Pillar::Context,
            questions: vec![metal, mix],
        },
        SurveySection {
            id: products_id,
            survey_id: survey.id,
            title: "Products".to_owned(),
            description: None,
            sort_order: 2,
            pillar: Pillar::MixVolumes,
            questions: vec![products],
        },
    ];

    RetailSurvey {
        definition: SurveyDefinition::new(survey, sections, vec![rule]).expect("valid survey"),
        metal: ids.0,
        mix: ids.1,
        products: ids.2,
    }
}

/// Copy of `survey` that no longer accepts submissions.
pub fn retired(survey: &RetailSurvey) -> RetailSurvey {
    let definition = &survey.definition;
    let header = Survey {
        is_active: false,
        ..definition.survey().clone()
    };
    RetailSurvey {
        definition: SurveyDefinition::new(
            header,
            definition.sections().to_vec(),
            definition.rules().to_vec(),
        )
        .expect("valid survey"),
        ..survey.clone()
    }
}

#[derive(Default)]
struct State {
    surveys: Vec<SurveyDefinition>,
    submissions: Vec<SubmissionRecord>,
    answers: Vec<(Uuid, SubmittedAnswer)>,
    receipts: Vec<(String, Uuid)>,
    cache: BTreeMap<AggregateCacheKey, AggregateCacheEntry>,
    queued: Vec<RefreshRequest>,
    audit: Vec<String>,
}

/// Shared in-memory backing for every persistence port.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store lock")
    }

    pub fn add_survey(&self, definition: SurveyDefinition) {
        self.lock().surveys.push(definition);
    }

    /// Refresh requests queued since the last call.
    pub fn take_queued(&self) -> Vec<RefreshRequest> {
        std::mem::take(&mut self.lock().queued)
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn survey_count(&self) -> usize {
        self.lock().surveys.len()
    }

    pub fn cache_keys(&self) -> Vec<AggregateCacheKey> {
        self.lock().cache.keys().cloned().collect()
    }

    pub fn audit_actors(&self) -> Vec<String> {
        self.lock().audit.clone()
    }

    /// Answers stored for one submission.
    pub fn answers_for(&self, submission_id: Uuid) -> Vec<SubmittedAnswer> {
        self.lock()
            .answers
            .iter()
            .filter(|(owner, _)| *owner == submission_id)
            .map(|(_, answer)| answer.clone())
            .collect()
    }
}

fn matches_filter(record: &SubmissionRecord, filter: &AggregationFilter) -> bool {
    record.survey_id == filter.survey_id
        && record.sector == filter.sector
        && record.period == filter.period
        && filter
            .size_band
            .as_ref()
            .is_none_or(|band| *band == record.size_band)
}

#[async_trait]
impl SurveyRepository for InMemoryStore {
    async fn find_definition(
        &self,
        survey_id: Uuid,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError> {
        Ok(self
            .lock()
            .surveys
            .iter()
            .find(|definition| definition.survey().id == survey_id)
            .cloned())
    }

    async fn active_survey_for_sector(
        &self,
        sector: Sector,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError> {
        Ok(self
            .lock()
            .surveys
            .iter()
            .filter(|definition| {
                definition.survey().is_active && definition.survey().sector == sector
            })
            .max_by_key(|definition| definition.survey().period)
            .cloned())
    }

    async fn list_active_definitions(
        &self,
    ) -> Result<Vec<SurveyDefinition>, SurveyRepositoryError> {
        Ok(self
            .lock()
            .surveys
            .iter()
            .filter(|definition| definition.survey().is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryStore {
    async fn record(
        &self,
        submission: &NewSubmission,
    ) -> Result<SubmissionRecord, SubmissionRepositoryError> {
        let mut state = self.lock();
        let active = state
            .surveys
            .iter()
            .any(|definition| {
                definition.survey().id == submission.survey_id && definition.survey().is_active
            });
        if !active {
            return Err(SubmissionRepositoryError::survey_unavailable(
                submission.survey_id,
            ));
        }
        if state
            .receipts
            .iter()
            .any(|(hash, _)| *hash == submission.receipt_hash)
        {
            return Err(SubmissionRepositoryError::duplicate_receipt());
        }

        let record = SubmissionRecord {
            id: submission.id,
            survey_id: submission.survey_id,
            sector: submission.sector,
            period: submission.period,
            size_band: submission.size_band.clone(),
            submitted_at: Utc::now(),
        };
        state.submissions.push(record.clone());
        state.answers.extend(
            submission
                .answers
                .iter()
                .map(|answer| (submission.id, answer.clone())),
        );
        state
            .receipts
            .push((submission.receipt_hash.clone(), submission.id));
        Ok(record)
    }

    async fn find_by_receipt_hash(
        &self,
        receipt_hash: &str,
    ) -> Result<Option<SubmissionRecord>, SubmissionRepositoryError> {
        let state = self.lock();
        let Some((_, submission_id)) = state
            .receipts
            .iter()
            .find(|(hash, _)| hash == receipt_hash)
        else {
            return Ok(None);
        };
        Ok(state
            .submissions
            .iter()
            .find(|record| record.id == *submission_id)
            .cloned())
    }
}

#[async_trait]
impl AnswerAggregationSource for InMemoryStore {
    async fn answer_groups(
        &self,
        question_id: Uuid,
        filter: &AggregationFilter,
    ) -> Result<Vec<AnswerGroup>, AnswerAggregationSourceError> {
        let state = self.lock();
        let mut groups: BTreeMap<(Option<String>, Option<String>), (u64, Vec<Uuid>)> =
            BTreeMap::new();
        for (submission_id, answer) in &state.answers {
            if answer.question_id != question_id {
                continue;
            }
            let included = state
                .submissions
                .iter()
                .any(|record| record.id == *submission_id && matches_filter(record, filter));
            if !included {
                continue;
            }
            let key = match answer.value.to_stored() {
                StoredAnswer::Scalar(value) => (Some(value), None),
                StoredAnswer::Complex(values) => (None, Some(values.to_string())),
            };
            let group = groups.entry(key).or_default();
            group.0 += 1;
            if !group.1.contains(submission_id) {
                group.1.push(*submission_id);
            }
        }
        Ok(groups
            .into_iter()
            .map(|((value, values), (row_count, submission_ids))| AnswerGroup {
                value,
                values,
                row_count,
                submission_ids,
            })
            .collect())
    }

    async fn distinct_size_bands(
        &self,
        survey_id: Uuid,
    ) -> Result<Vec<SizeBand>, AnswerAggregationSourceError> {
        let mut bands: Vec<SizeBand> = self
            .lock()
            .submissions
            .iter()
            .filter(|record| record.survey_id == survey_id)
            .map(|record| record.size_band.clone())
            .collect();
        bands.sort();
        bands.dedup();
        Ok(bands)
    }
}

#[async_trait]
impl AggregateCacheRepository for InMemoryStore {
    async fn find(
        &self,
        key: &AggregateCacheKey,
    ) -> Result<Option<AggregateCacheEntry>, AggregateCacheRepositoryError> {
        Ok(self.lock().cache.get(key).cloned())
    }

    async fn upsert(
        &self,
        entry: &AggregateCacheEntry,
    ) -> Result<(), AggregateCacheRepositoryError> {
        self.lock().cache.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn replace_all(
        &self,
        entries: &[AggregateCacheEntry],
    ) -> Result<usize, AggregateCacheRepositoryError> {
        let mut state = self.lock();
        state.cache = entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.clone()))
            .collect();
        Ok(state.cache.len())
    }

    async fn list_recent(
        &self,
        limit: usize,
    ) -> Result<Vec<AggregateCacheEntry>, AggregateCacheRepositoryError> {
        let mut entries: Vec<AggregateCacheEntry> = self.lock().cache.values().cloned().collect();
        entries.sort_by(|left, right| right.computed_at.cmp(&left.computed_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl CacheRefreshQueue for InMemoryStore {
    async fn enqueue(&self, request: RefreshRequest) -> Result<(), CacheRefreshQueueError> {
        self.lock().queued.push(request);
        Ok(())
    }
}

#[async_trait]
impl DataResetRepository for InMemoryStore {
    async fn reset_all(
        &self,
        audit: &DataResetAudit,
    ) -> Result<DeletedCounts, DataResetRepositoryError> {
        let mut state = self.lock();
        let counts = DeletedCounts {
            answers: state.answers.len() as u64,
            receipt_codes: state.receipts.len() as u64,
            submissions: state.submissions.len() as u64,
            cache_entries: state.cache.len() as u64,
        };
        state.answers.clear();
        state.receipts.clear();
        state.submissions.clear();
        state.cache.clear();
        state.audit.push(audit.requested_by.clone());
        Ok(counts)
    }
}

#[async_trait]
impl SubmissionStatsQuery for InMemoryStore {
    async fn counts(
        &self,
        filter: &SubmissionCountFilter,
    ) -> Result<SubmissionCounts, SubmissionStatsQueryError> {
        let state = self.lock();
        let mut counts = SubmissionCounts::default();
        let mut periods: BTreeMap<(i32, u8), u64> = BTreeMap::new();
        for record in state.submissions.iter().filter(|record| {
            filter.sector.is_none_or(|sector| sector == record.sector)
                && filter.year.is_none_or(|year| year == record.period.year())
                && filter
                    .quarter
                    .is_none_or(|quarter| quarter == record.period.quarter())
                && filter
                    .size_band
                    .as_ref()
                    .is_none_or(|band| *band == record.size_band)
        }) {
            counts.total += 1;
            *counts.by_sector.entry(record.sector).or_default() += 1;
            *counts
                .by_size_band
                .entry(record.size_band.clone())
                .or_default() += 1;
            *periods
                .entry((record.period.year(), record.period.quarter()))
                .or_default() += 1;
        }
        counts.by_period = periods
            .into_iter()
            .map(|((year, quarter), count)| PeriodCount {
                year,
                quarter,
                count,
            })
            .collect();
        Ok(counts)
    }
}

/// Submission service writing to `store`.
pub type StoreSubmissions = SubmissionService<InMemoryStore, InMemoryStore, InMemoryStore>;
/// Aggregation service over `store` with metrics discarded.
pub type StoreAggregation =
    AggregationService<InMemoryStore, InMemoryStore, InMemoryStore, NoOpCacheRefreshMetrics>;
/// Reporting service over `store` with a fixed threshold.
pub type StoreReporting = ReportingService<InMemoryStore, InMemoryStore, FixedThreshold>;

pub fn submission_service(store: &InMemoryStore) -> StoreSubmissions {
    let shared = Arc::new(store.clone());
    SubmissionService::new(Arc::clone(&shared), Arc::clone(&shared), shared)
}

pub fn aggregation_service(store: &InMemoryStore) -> StoreAggregation {
    let shared = Arc::new(store.clone());
    AggregationService::new(
        Arc::clone(&shared),
        Arc::clone(&shared),
        shared,
        Arc::new(NoOpCacheRefreshMetrics),
        Arc::new(DefaultClock),
    )
}

pub fn reporting_service(store: &InMemoryStore, threshold: u64) -> StoreReporting {
    let shared = Arc::new(store.clone());
    ReportingService::new(
        Arc::clone(&shared),
        shared,
        KAnonymityGuard::with_env(FixedThreshold(threshold)),
    )
}

/// Answers naming a main metal and a gold/silver sales split.
pub fn metal_answers(survey: &RetailSurvey, metal: &str, gold: f64, silver: f64) -> AnswerSet {
    let mut answers = AnswerSet::new();
    answers.insert(survey.metal, AnswerValue::Text(metal.to_owned()));
    answers.insert(
        survey.mix,
        AnswerValue::Split(BTreeMap::from([
            ("gold".to_owned(), gold),
            ("silver".to_owned(), silver),
        ])),
    );
    if metal != "none" {
        answers.insert(
            survey.products,
            AnswerValue::Choices(vec!["rings".to_owned(), "chains".to_owned()]),
        );
    }
    answers
}

/// Payload for the retail survey from a respondent in `band`.
pub fn payload(survey: &RetailSurvey, band: &str, answers: AnswerSet) -> SubmissionPayload {
    SubmissionPayload {
        survey_id: survey.survey_id(),
        sector: Sector::Retailers,
        size_band: SizeBand::new(band).expect("valid size band"),
        answers,
    }
}

/// Run every queued refresh through `aggregation`.
pub async fn drain_refreshes(store: &InMemoryStore, aggregation: &StoreAggregation) {
    for request in store.take_queued() {
        aggregation
            .refresh_cache_for_submission(&request)
            .await
            .expect("refresh succeeds");
    }
}

/// Whether `code` matches any stored receipt hash.
pub fn receipt_is_stored(store: &InMemoryStore, code: &str) -> bool {
    store
        .lock()
        .receipts
        .iter()
        .any(|(hash, _)| verify_receipt_code(code, hash))
}
