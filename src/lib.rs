//! Bank SMS ingestion into a de-duplicated personal ledger.

pub mod config;
pub mod db;
pub mod dedup;
pub mod ingest;
pub mod listener;
pub mod manual;
pub mod model;
pub mod parser;
pub mod sender;
pub mod source;
pub mod store;
pub mod summary;

pub use ingest::{BatchPipeline, BatchReport, IngestError, IngestOutcome, Ingestor, TimestampPolicy};
pub use listener::{LiveListener, StartOutcome};
pub use model::{NewTransaction, Origin, PersistedTransaction, RawMessage, TransactionCandidate, TransactionKind};
pub use store::{StoreError, TransactionStore};
