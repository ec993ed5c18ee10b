use super::AuditSink;
use crate::error::SinkError;
use async_trait::async_trait;
use monay_audit_types::AuditEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Keeps events in process memory.
///
/// Useful for embedding (an admin view of recent activity) and as the test
/// double for the pipeline.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Arc<AuditEvent>>>,
    written: Notify,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events written so far, oldest first.
    pub fn events(&self) -> Vec<Arc<AuditEvent>> {
        self.events.lock().clone()
    }

    /// Number of events written.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// No event written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Wait until at least `count` events arrived or `timeout` elapsed, then
    /// return the snapshot.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> Vec<Arc<AuditEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.written.notified();
            if self.len() >= count {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }
        self.events()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, event: Arc<AuditEvent>) -> Result<(), SinkError> {
        self.events.lock().push(event);
        self.written.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_events() {
        let sink = Arc::new(MemorySink::new());
        let writer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let event = AuditEvent::builder("USERS_CREATE", "users").build();
            writer.write(Arc::new(event)).await.unwrap();
        });

        let events = sink.wait_for_events(1, Duration::from_secs(2)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "USERS_CREATE");
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let sink = MemorySink::new();
        let events = sink.wait_for_events(1, Duration::from_millis(20)).await;
        assert!(events.is_empty());
    }
}
