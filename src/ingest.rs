//! Shared parse → validate → dedup → persist core and the batch pipeline.
use crate::dedup::DuplicateDetector;
use crate::model::{from_epoch_millis, NewTransaction, Origin, RawMessage, TransactionCandidate};
use crate::parser;
use crate::sender::SenderClassifier;
use crate::source::{MessageSource, SourceError};
use crate::store::{StoreError, TransactionStore};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Category given to every SMS-derived record.
pub const DEFAULT_CATEGORY: &str = "CASH";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which instant becomes a candidate's `occurred_at`.
///
/// Batch ingestion uses the message's own timestamp; the live listener uses
/// the moment of processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    MessageTimestamp,
    ProcessingTime,
}

impl TimestampPolicy {
    pub fn from_use_message_timestamp(use_message_timestamp: bool) -> Self {
        if use_message_timestamp {
            TimestampPolicy::MessageTimestamp
        } else {
            TimestampPolicy::ProcessingTime
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Unknown kind or zero amount; dropped before touching the store.
    Invalid,
    Duplicate,
    Persisted(i64),
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn TransactionStore>,
    detector: DuplicateDetector,
    category: String,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            detector: DuplicateDetector::new(store.clone()),
            store,
            category: DEFAULT_CATEGORY.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Parse `message`, stamping it according to `policy`. Processing time is
    /// truncated to whole milliseconds, the precision records are stored at.
    /// Returns `None` when the policy asks for a message timestamp that is out
    /// of range.
    pub fn candidate(&self, message: &RawMessage, policy: TimestampPolicy) -> Option<TransactionCandidate> {
        let occurred_at = match policy {
            TimestampPolicy::MessageTimestamp => match message.received_at() {
                Some(ts) => ts,
                None => {
                    warn!(timestamp = message.timestamp, address = %message.address, "message timestamp out of range");
                    return None;
                }
            },
            TimestampPolicy::ProcessingTime => {
                from_epoch_millis(self.clock.now().timestamp_millis())
            }
        };
        Some(parser::parse(&message.body, &message.address, occurred_at))
    }

    /// Dedup-check then insert one valid candidate as an SMS record.
    ///
    /// Losing an insert race to the store's uniqueness constraint counts as a
    /// duplicate. Any other store failure aborts this candidate.
    #[instrument(skip_all, fields(bank = %candidate.source_bank, amount = %candidate.amount))]
    pub async fn persist(&self, candidate: &TransactionCandidate) -> Result<IngestOutcome, StoreError> {
        if !candidate.is_valid() {
            return Ok(IngestOutcome::Invalid);
        }
        if self.detector.exists(candidate).await? {
            debug!("duplicate transaction skipped");
            return Ok(IngestOutcome::Duplicate);
        }
        let record = NewTransaction::from_candidate(candidate, &self.category);
        match self.store.insert(&record).await {
            Ok(id) => {
                info!(id, kind = candidate.kind.as_str(), "saved sms transaction");
                Ok(IngestOutcome::Persisted(id))
            }
            Err(err) if err.is_conflict() => {
                debug!("duplicate transaction skipped after insert conflict");
                Ok(IngestOutcome::Duplicate)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn ingest(
        &self,
        message: &RawMessage,
        policy: TimestampPolicy,
    ) -> Result<IngestOutcome, StoreError> {
        match self.candidate(message, policy) {
            Some(candidate) => self.persist(&candidate).await,
            None => Ok(IngestOutcome::Invalid),
        }
    }
}

/// Result of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Every valid, bank-originated candidate, persisted or not, in source order.
    pub candidates: Vec<TransactionCandidate>,
    pub fetched: usize,
    pub already_seen: usize,
    pub foreign_sender: usize,
    pub invalid: usize,
    pub persisted: usize,
    pub duplicates: usize,
}

pub struct BatchPipeline {
    ingestor: Ingestor,
    classifier: SenderClassifier,
    concurrency: usize,
}

impl BatchPipeline {
    pub fn new(ingestor: Ingestor, classifier: SenderClassifier) -> Self {
        Self {
            ingestor,
            classifier,
            concurrency: 1,
        }
    }

    /// Number of candidates persisted at once. Results keep source order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, source: &dyn MessageSource) -> Result<Vec<TransactionCandidate>, IngestError> {
        Ok(self.run_with_report(source).await?.candidates)
    }

    #[instrument(skip_all)]
    pub async fn run_with_report(&self, source: &dyn MessageSource) -> Result<BatchReport, IngestError> {
        let messages = source.list_inbox_messages().await?;
        let mark = self
            .ingestor
            .store()
            .max_timestamp(Origin::Sms)
            .await?
            .map(|ts| ts.timestamp_millis())
            .unwrap_or(0);

        let mut report = BatchReport {
            fetched: messages.len(),
            ..BatchReport::default()
        };

        for message in &messages {
            // A message stamped exactly at the mark counts as already seen.
            if message.timestamp <= mark {
                report.already_seen += 1;
                continue;
            }
            if !self.classifier.is_bank_sender(&message.address) {
                report.foreign_sender += 1;
                continue;
            }
            match self
                .ingestor
                .candidate(message, TimestampPolicy::MessageTimestamp)
            {
                Some(candidate) if candidate.is_valid() => report.candidates.push(candidate),
                _ => report.invalid += 1,
            }
        }

        let outcomes: Vec<IngestOutcome> = stream::iter(&report.candidates)
            .map(|candidate| self.ingestor.persist(candidate))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        for outcome in outcomes {
            match outcome {
                IngestOutcome::Persisted(_) => report.persisted += 1,
                IngestOutcome::Duplicate => report.duplicates += 1,
                IngestOutcome::Invalid => report.invalid += 1,
            }
        }

        info!(
            high_water_mark = mark,
            fetched = report.fetched,
            already_seen = report.already_seen,
            foreign_sender = report.foreign_sender,
            invalid = report.invalid,
            persisted = report.persisted,
            duplicates = report.duplicates,
            "batch ingestion finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionKind;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(
            TimestampPolicy::from_use_message_timestamp(true),
            TimestampPolicy::MessageTimestamp
        );
        assert_eq!(
            TimestampPolicy::from_use_message_timestamp(false),
            TimestampPolicy::ProcessingTime
        );
    }

    #[tokio::test]
    async fn candidate_stamp_follows_policy() {
        let store = crate::db::SqliteStore::connect("sqlite::memory:").await.unwrap();
        let now = from_epoch_millis(1_800_000_000_000) + chrono::Duration::microseconds(1_500);
        let ingestor = Ingestor::new(Arc::new(store)).with_clock(Arc::new(FixedClock(now)));
        let msg = RawMessage::new("Rs 5 debited", "HDFCBK", 1_000);

        let by_message = ingestor
            .candidate(&msg, TimestampPolicy::MessageTimestamp)
            .unwrap();
        assert_eq!(by_message.occurred_at, from_epoch_millis(1_000));
        assert_eq!(by_message.kind, TransactionKind::Debit);

        let by_clock = ingestor
            .candidate(&msg, TimestampPolicy::ProcessingTime)
            .unwrap();
        assert_eq!(by_clock.occurred_at, from_epoch_millis(1_800_000_000_001));

        let far = RawMessage::new("Rs 5 debited", "HDFCBK", i64::MAX);
        assert!(ingestor.candidate(&far, TimestampPolicy::MessageTimestamp).is_none());
        assert!(ingestor.candidate(&far, TimestampPolicy::ProcessingTime).is_some());
    }
}
