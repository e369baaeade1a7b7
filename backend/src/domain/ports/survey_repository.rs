//! Port for loading survey definitions.
//!
//! Definitions are static once authored, so the port is read-only.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Sector, SurveyDefinition};

use super::define_port_error;

define_port_error! {
    /// Errors raised by survey definition adapters.
    pub enum SurveyRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "survey repository connection failed: {message}",
        /// Query failed or returned rows that do not form a valid definition.
        Query { message: String } => "survey repository query failed: {message}",
    }
}

/// Read access to assembled survey definitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurveyRepository: Send + Sync {
    /// Load a survey by id, active or retired.
    async fn find_definition(
        &self,
        survey_id: Uuid,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError>;

    /// Load the most recent active survey for a sector.
    async fn active_survey_for_sector(
        &self,
        sector: Sector,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError>;

    /// Load every active survey.
    async fn list_active_definitions(&self)
    -> Result<Vec<SurveyDefinition>, SurveyRepositoryError>;
}
