use crate::model::TransactionCandidate;
use crate::store::{StoreError, TransactionStore};
use std::sync::Arc;
use tracing::instrument;

/// Exact `(amount, occurred_at, source_bank)` lookup against the store.
///
/// No tolerance window: one millisecond or one paisa apart is a different
/// transaction. Store failures are returned as-is and must not be read as
/// either verdict.
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn TransactionStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(bank = %candidate.source_bank))]
    pub async fn exists(&self, candidate: &TransactionCandidate) -> Result<bool, StoreError> {
        self.store
            .exists_matching(
                candidate.amount,
                candidate.occurred_at,
                &candidate.source_bank,
            )
            .await
    }
}
