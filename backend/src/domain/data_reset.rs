//! Administrative wipe of all respondent data.

use std::sync::Arc;

use tracing::{info, warn};

use super::Error;
use super::ports::{
    DataResetAudit, DataResetRepository, DataResetRepositoryError, DeletedCounts, port_failure,
};

/// Phrase an operator must type to confirm a reset.
pub const RESET_CONFIRMATION_PHRASE: &str = "DELETE ALL SURVEY DATA";

/// Operator request to wipe respondent data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResetRequest {
    /// Label of the operator, recorded in the audit log.
    pub requested_by: String,
    pub confirmation: String,
}

fn map_reset_error(error: DataResetRepositoryError) -> Error {
    port_failure("data reset", &error)
}

/// Deletes submissions, answers, receipt codes, and cache rows.
#[derive(Clone)]
pub struct DataResetService<R> {
    repository: Arc<R>,
}

impl<R> DataResetService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }
}

impl<R: DataResetRepository> DataResetService<R> {
    /// Wipe respondent data after checking the confirmation phrase.
    ///
    /// The phrase must match exactly, case included.
    pub async fn reset(&self, request: DataResetRequest) -> Result<DeletedCounts, Error> {
        if request.confirmation != RESET_CONFIRMATION_PHRASE {
            warn!("data reset refused: confirmation phrase mismatch");
            return Err(Error::invalid_request(format!(
                "type \"{RESET_CONFIRMATION_PHRASE}\" to confirm"
            )));
        }
        let requested_by = request.requested_by.trim();
        if requested_by.is_empty() {
            return Err(Error::invalid_request("requested_by must not be empty"));
        }

        let audit = DataResetAudit {
            requested_by: requested_by.to_owned(),
        };
        let counts = self
            .repository
            .reset_all(&audit)
            .await
            .map_err(map_reset_error)?;
        info!(
            requested_by = %audit.requested_by,
            answers = counts.answers,
            receipt_codes = counts.receipt_codes,
            submissions = counts.submissions,
            cache_entries = counts.cache_entries,
            "survey data reset"
        );
        Ok(counts)
    }
}
