//! Raw message sources: a pulled inbox batch and a pushed live feed.
use crate::model::RawMessage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("message source unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message data: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Every inbox entry currently available, in source order.
    async fn list_inbox_messages(&self) -> Result<Vec<RawMessage>, SourceError>;

    /// Start receiving new messages as they arrive.
    async fn subscribe(&self) -> Result<Subscription, SourceError>;
}

/// Live feed handle. Dropping it or calling `unsubscribe` ends delivery.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<RawMessage>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<RawMessage>) -> Self {
        Self { rx }
    }

    /// Next message, or `None` once the source has closed the feed.
    pub async fn next(&mut self) -> Option<RawMessage> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

/// Inbox export on disk: a JSON array of messages. Batch only.
#[derive(Debug, Clone)]
pub struct JsonInboxSource {
    path: PathBuf,
}

impl JsonInboxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessageSource for JsonInboxSource {
    async fn list_inbox_messages(&self) -> Result<Vec<RawMessage>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            SourceError::Unavailable(format!("cannot read {}: {}", self.path.display(), err))
        })?;
        let messages: Vec<RawMessage> = serde_json::from_str(&content)?;
        debug!(count = messages.len(), path = %self.path.display(), "read inbox export");
        Ok(messages)
    }

    async fn subscribe(&self) -> Result<Subscription, SourceError> {
        Err(SourceError::Unavailable(
            "an inbox export has no live feed".into(),
        ))
    }
}

/// Newline-delimited JSON messages from an async reader (stdin in the CLI).
/// The reader can back a single subscription; malformed lines are skipped.
pub struct LineSource<R> {
    reader: Mutex<Option<R>>,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
        }
    }
}

#[async_trait]
impl<R> MessageSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn list_inbox_messages(&self) -> Result<Vec<RawMessage>, SourceError> {
        Err(SourceError::Unavailable(
            "a line feed has no inbox to list".into(),
        ))
    }

    async fn subscribe(&self) -> Result<Subscription, SourceError> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| SourceError::Unavailable("line reader lock poisoned".into()))?
            .take()
            .ok_or_else(|| SourceError::Unavailable("line feed already consumed".into()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = tokio::select! {
                    _ = tx.closed() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<RawMessage>(&line) {
                        Ok(msg) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(?err, "skipping malformed message line"),
                    },
                    Ok(None) => break,
                    Err(err) => {
                        warn!(?err, "line feed read failed");
                        break;
                    }
                }
            }
            debug!("line feed closed");
        });
        Ok(Subscription::new(rx))
    }
}

/// In-process source: a fixed inbox plus a live feed driven by `deliver`.
/// Holds at most one live subscription; a second `subscribe` while the first
/// is open is `Unavailable`. Can be switched unavailable to simulate platform
/// failures.
#[derive(Debug, Default)]
pub struct ChannelSource {
    inbox: Mutex<Vec<RawMessage>>,
    subscriber: Mutex<Option<mpsc::Sender<RawMessage>>>,
    unavailable: AtomicBool,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbox(messages: Vec<RawMessage>) -> Self {
        Self {
            inbox: Mutex::new(messages),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live subscriptions that have not been dropped.
    pub fn subscriber_count(&self) -> usize {
        self.live_subscriber().map_or(0, |_| 1)
    }

    /// Push a message to the live subscription; returns whether it was taken.
    pub async fn deliver(&self, message: RawMessage) -> bool {
        match self.live_subscriber() {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    fn live_subscriber(&self) -> Option<mpsc::Sender<RawMessage>> {
        let mut slot = self.subscriber.lock().ok()?;
        if slot.as_ref().is_some_and(|tx| tx.is_closed()) {
            *slot = None;
        }
        slot.clone()
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("source switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn list_inbox_messages(&self) -> Result<Vec<RawMessage>, SourceError> {
        self.check_available()?;
        let inbox = self
            .inbox
            .lock()
            .map_err(|_| SourceError::Unavailable("inbox lock poisoned".into()))?;
        Ok(inbox.clone())
    }

    async fn subscribe(&self) -> Result<Subscription, SourceError> {
        self.check_available()?;
        let mut slot = self
            .subscriber
            .lock()
            .map_err(|_| SourceError::Unavailable("subscriber lock poisoned".into()))?;
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(SourceError::Unavailable(
                "a live subscription is already open".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        *slot = Some(tx);
        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn json_inbox_reads_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"body":"Rs 10 debited","address":"HDFCBK","date":5}},
               {{"body":"hi","originatingAddress":"+91","timestamp":6}}]"#
        )
        .unwrap();
        let source = JsonInboxSource::new(file.path());
        let msgs = source.list_inbox_messages().await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].timestamp, 5);
        assert_eq!(msgs[1].address, "+91");
        assert!(matches!(
            source.subscribe().await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_inbox_is_unavailable() {
        let source = JsonInboxSource::new("/definitely/not/here.json");
        assert!(matches!(
            source.list_inbox_messages().await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn line_source_skips_bad_lines_and_ends_at_eof() {
        let data = "{\"body\":\"a\",\"address\":\"X\",\"timestamp\":1}\nnot json\n\n{\"body\":\"b\",\"address\":\"Y\",\"timestamp\":2}\n";
        let source = LineSource::new(tokio::io::BufReader::new(data.as_bytes()));
        let mut sub = source.subscribe().await.unwrap();
        assert_eq!(sub.next().await.unwrap().body, "a");
        assert_eq!(sub.next().await.unwrap().body, "b");
        assert!(sub.next().await.is_none());
        assert!(source.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn channel_source_holds_one_live_subscription() {
        let source = ChannelSource::new();
        assert!(!source.deliver(RawMessage::new("lost", "X", 0)).await);

        let first = source.subscribe().await.unwrap();
        assert!(matches!(
            source.subscribe().await,
            Err(SourceError::Unavailable(_))
        ));
        assert_eq!(source.subscriber_count(), 1);
        first.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);

        let mut second = source.subscribe().await.unwrap();
        assert!(source.deliver(RawMessage::new("m", "X", 1)).await);
        assert_eq!(second.next().await.unwrap().body, "m");

        source.set_unavailable(true);
        assert!(source.subscribe().await.is_err());
        assert!(source.list_inbox_messages().await.is_err());
    }
}
