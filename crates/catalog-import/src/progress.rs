//! Live progress channels, one per running job
//!
//! Each job gets a `tokio::sync::watch` channel holding its latest
//! [`JobSnapshot`]. Publishing never waits on readers and a slow reader only
//! ever sees the newest value, so any number of subscribers can follow a job
//! without affecting its executor. Subscription streams end right after the
//! terminal snapshot.

use crate::types::JobSnapshot;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

pub type ProgressStream = BoxStream<'static, JobSnapshot>;

/// Write side of one job's channel
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    sender: Arc<watch::Sender<JobSnapshot>>,
}

impl ProgressPublisher {
    fn new(initial: JobSnapshot) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, snapshot: JobSnapshot) {
        self.sender.send_replace(snapshot);
    }

    pub fn current(&self) -> JobSnapshot {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> ProgressStream {
        snapshot_stream(self.sender.subscribe())
    }
}

/// Emit the current value, then every change, stopping after a complete one.
fn snapshot_stream(receiver: watch::Receiver<JobSnapshot>) -> ProgressStream {
    stream::unfold(Some((receiver, true)), |state| async move {
        let (mut receiver, first) = state?;
        if !first && receiver.changed().await.is_err() {
            return None;
        }
        let snapshot = receiver.borrow_and_update().clone();
        let next = (!snapshot.is_complete).then_some((receiver, false));
        Some((snapshot, next))
    })
    .boxed()
}

/// Registry of live channels keyed by job id
#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    channels: Arc<RwLock<HashMap<Uuid, ProgressPublisher>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the publisher for a job, creating it if needed, and publish
    /// `snapshot` to it.
    pub async fn register(&self, snapshot: JobSnapshot) -> ProgressPublisher {
        let mut channels = self.channels.write().await;
        match channels.get(&snapshot.id()) {
            Some(publisher) => {
                publisher.publish(snapshot);
                publisher.clone()
            },
            None => {
                let publisher = ProgressPublisher::new(snapshot.clone());
                channels.insert(snapshot.id(), publisher.clone());
                publisher
            },
        }
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<JobSnapshot> {
        self.channels.read().await.get(&id).map(ProgressPublisher::current)
    }

    pub async fn subscribe(&self, id: Uuid) -> Option<ProgressStream> {
        self.channels.read().await.get(&id).map(ProgressPublisher::subscribe)
    }

    /// Drop the live channel. Existing subscribers still receive any value
    /// they have not seen yet.
    pub async fn remove(&self, id: Uuid) {
        self.channels.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{ImportJob, ImportStatus};

    fn snapshot(job: &ImportJob, status: ImportStatus, processed: u64) -> JobSnapshot {
        let mut job = job.clone();
        job.status = status;
        job.total_rows = 10;
        job.processed_rows = processed;
        job.successful_rows = processed;
        job.snapshot()
    }

    #[tokio::test]
    async fn test_subscriber_sees_current_then_updates_then_ends() {
        let hub = ProgressHub::new();
        let job = ImportJob::new("products.csv");
        let publisher = hub.register(job.snapshot()).await;

        let mut stream = hub.subscribe(job.id).await.unwrap();
        assert_eq!(stream.next().await.unwrap().status(), ImportStatus::Pending);

        publisher.publish(snapshot(&job, ImportStatus::Importing, 5));
        let update = stream.next().await.unwrap();
        assert_eq!(update.job.processed_rows, 5);

        publisher.publish(snapshot(&job, ImportStatus::Completed, 10));
        let last = stream.next().await.unwrap();
        assert!(last.is_complete);
        assert_eq!(last.progress_percentage, 100.0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_multiple_readers_are_independent() {
        let hub = ProgressHub::new();
        let job = ImportJob::new("products.csv");
        let publisher = hub.register(job.snapshot()).await;

        let first = hub.subscribe(job.id).await.unwrap();
        let second = hub.subscribe(job.id).await.unwrap();

        publisher.publish(snapshot(&job, ImportStatus::Completed, 10));

        let a: Vec<_> = first.collect().await;
        let b: Vec<_> = second.collect().await;
        // Readers that lag only observe the latest value.
        assert!(a.last().unwrap().is_complete);
        assert!(b.last().unwrap().is_complete);
    }

    #[tokio::test]
    async fn test_removed_channel_still_delivers_terminal_value() {
        let hub = ProgressHub::new();
        let job = ImportJob::new("products.csv");
        let publisher = hub.register(job.snapshot()).await;
        let mut stream = hub.subscribe(job.id).await.unwrap();
        stream.next().await.unwrap();

        publisher.publish(snapshot(&job, ImportStatus::Failed, 3));
        hub.remove(job.id).await;
        drop(publisher);

        assert_eq!(stream.next().await.unwrap().status(), ImportStatus::Failed);
        assert!(stream.next().await.is_none());
        assert!(hub.subscribe(job.id).await.is_none());
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_existing_reuses_channel() {
        let hub = ProgressHub::new();
        let job = ImportJob::new("products.csv");
        hub.register(job.snapshot()).await;
        hub.register(snapshot(&job, ImportStatus::Parsing, 0)).await;

        assert_eq!(hub.len().await, 1);
        assert_eq!(hub.snapshot(job.id).await.unwrap().status(), ImportStatus::Parsing);
    }
}
