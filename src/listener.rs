//! Live ingestion: one subscription, one worker task, explicit start/stop.
use crate::ingest::{IngestOutcome, Ingestor, TimestampPolicy};
use crate::model::RawMessage;
use crate::sender::SenderClassifier;
use crate::source::{MessageSource, SourceError, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Per-message tallies since the listener was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerCounts {
    pub received: u64,
    pub persisted: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub filtered: u64,
    pub failed: u64,
}

impl ListenerCounts {
    /// Messages whose handling has finished, whatever the outcome.
    pub fn settled(&self) -> u64 {
        self.persisted + self.duplicates + self.invalid + self.filtered + self.failed
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    persisted: AtomicU64,
    duplicates: AtomicU64,
    invalid: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerCounts {
        ListenerCounts {
            received: self.received.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            duplicates: self.duplicates.load(Ordering::SeqCst),
            invalid: self.invalid.load(Ordering::SeqCst),
            filtered: self.filtered.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

#[derive(Clone)]
struct Worker {
    ingestor: Ingestor,
    policy: TimestampPolicy,
    sender_filter: Option<SenderClassifier>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, mut subscription: Subscription, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                message = subscription.next() => message,
            };
            match message {
                Some(message) => self.handle(message).await,
                None => {
                    info!("live feed closed by source");
                    break;
                }
            }
        }
        subscription.unsubscribe();
    }

    async fn handle(&self, message: RawMessage) {
        self.counters.received.fetch_add(1, Ordering::SeqCst);

        if let Some(filter) = &self.sender_filter {
            if !filter.is_bank_sender(&message.address) {
                debug!(address = %message.address, "ignoring message from unrecognised sender");
                self.counters.filtered.fetch_add(1, Ordering::SeqCst);
                return;
            }
        }

        match self.ingestor.ingest(&message, self.policy).await {
            Ok(IngestOutcome::Persisted(id)) => {
                info!(id, address = %message.address, "saved live sms transaction");
                self.counters.persisted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(IngestOutcome::Duplicate) => {
                debug!(address = %message.address, "duplicate live transaction skipped");
                self.counters.duplicates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(IngestOutcome::Invalid) => {
                self.counters.invalid.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                error!(?err, address = %message.address, "failed to ingest live message");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Owns at most one live subscription. Sources hand out a single open
/// subscription, so a second listener on the same source fails to start until
/// the first is stopped.
///
/// Defaults to stamping records with processing time and to accepting every
/// sender, unlike the batch pipeline.
pub struct LiveListener {
    worker: Worker,
    source: Arc<dyn MessageSource>,
    running: Mutex<Option<Running>>,
}

impl LiveListener {
    pub fn new(ingestor: Ingestor, source: Arc<dyn MessageSource>) -> Self {
        Self {
            worker: Worker {
                ingestor,
                policy: TimestampPolicy::ProcessingTime,
                sender_filter: None,
                counters: Arc::new(Counters::default()),
            },
            source,
            running: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: TimestampPolicy) -> Self {
        self.worker.policy = policy;
        self
    }

    pub fn with_sender_filter(mut self, filter: Option<SenderClassifier>) -> Self {
        self.worker.sender_filter = filter;
        self
    }

    /// Subscribe and spawn the worker. A no-op while a subscription is live.
    /// A failed subscription leaves the listener stopped so a later call can
    /// retry.
    pub async fn start(&self) -> Result<StartOutcome, SourceError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.worker.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
        }
        if let Some(stale) = running.take() {
            let _ = stale.worker.await;
        }

        let subscription = match self.source.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(?err, "live subscription failed");
                return Err(err);
            }
        };
        let (shutdown, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(self.worker.clone().run(subscription, shutdown_rx));
        *running = Some(Running { shutdown, worker });
        info!("sms listener started");
        Ok(StartOutcome::Started)
    }

    /// Stop the subscription and wait for the worker to exit. Once this
    /// returns no further message is processed. Returns `false` when nothing
    /// was running.
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };
        let _ = current.shutdown.send(());
        if let Err(err) = current.worker.await {
            error!(?err, "sms listener worker ended abnormally");
        }
        info!("sms listener stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.worker.is_finished())
            .unwrap_or(false)
    }

    pub fn counts(&self) -> ListenerCounts {
        self.worker.counters.snapshot()
    }
}
