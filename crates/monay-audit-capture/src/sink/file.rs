use super::AuditSink;
use crate::error::SinkError;
use async_trait::async_trait;
use monay_audit_types::AuditEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// File the sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonLinesSink {
    fn name(&self) -> &str {
        "json_lines"
    }

    async fn write(&self, event: Arc<AuditEvent>) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event.as_ref())?;
        line.push(b'\n');

        // One write_all per line under the lock keeps lines from interleaving.
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monay_audit_types::AuditCategory;

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/events.jsonl");
        let sink = JsonLinesSink::open(&path).await.unwrap();

        for action in ["USERS_CREATE", "PAYMENTS_CREATE"] {
            let event = AuditEvent::builder(action, "api")
                .category(AuditCategory::Financial)
                .build();
            sink.write(Arc::new(event)).await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, "PAYMENTS_CREATE");
        assert_eq!(second.category, AuditCategory::Financial);
    }
}
