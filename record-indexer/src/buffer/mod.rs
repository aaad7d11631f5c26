//! Update batching and commit cadence.
//!
//! The buffer accumulates a serialized add batch and a delete queue,
//! flushing on record-count and byte ceilings and issuing intermediate
//! commits on a configurable cadence. A final `flush` drains both batches
//! and awaits the background transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use record_indexer_shared::types::document::value_to_string;
use record_indexer_shared::IndexDocument;
use record_indexer_solr::{payloads, UpdateTransport};

use crate::errors::PipelineError;

/// Queued deletions are flushed as one envelope at this many ids.
const DELETE_BATCH_LIMIT: usize = 1000;

/// Ceilings and cadence of the update buffer.
#[derive(Debug, Clone)]
pub struct UpdateBufferConfig {
    /// Maximum documents per add batch.
    pub max_update_records: usize,
    /// Maximum add batch size in bytes.
    pub max_update_size: usize,
    /// Records between intermediate commits; `0` disables them.
    pub commit_interval: u64,
}

impl Default for UpdateBufferConfig {
    fn default() -> Self {
        Self {
            max_update_records: 5000,
            max_update_size: 1024 * 1024,
            commit_interval: 50000,
        }
    }
}

/// Accumulates additions and deletions for the search backend.
pub struct UpdateBuffer {
    transport: Arc<dyn UpdateTransport>,
    config: UpdateBufferConfig,
    add_batch: String,
    add_count: usize,
    delete_batch: Vec<String>,
    adds_total: u64,
    deletes_total: u64,
}

impl UpdateBuffer {
    pub fn new(transport: Arc<dyn UpdateTransport>, config: UpdateBufferConfig) -> Self {
        Self {
            transport,
            config,
            add_batch: String::new(),
            add_count: 0,
            delete_batch: Vec::new(),
            adds_total: 0,
            deletes_total: 0,
        }
    }

    /// Queue a document for addition.
    ///
    /// A list-valued `allfields` is joined to a single space-separated
    /// string first; the backend expects a scalar. The batch is sent when
    /// either ceiling is reached, and an intermediate commit is issued
    /// every `commit_interval` records unless `no_commit` is set.
    pub async fn add(
        &mut self,
        mut document: IndexDocument,
        sequence: u64,
        no_commit: bool,
    ) -> Result<(), PipelineError> {
        if let Some(Value::Array(_)) = document.get("allfields") {
            let joined = document
                .get("allfields")
                .map(value_to_string)
                .unwrap_or_default();
            document.insert("allfields", joined);
        }

        let serialized = serde_json::to_string(&document)
            .map_err(|e| PipelineError::SerializationError(e.to_string()))?;

        // Send the pending batch first when appending would cross a
        // ceiling, so no batch ever exceeds the configured limits.
        let projected_len = self.add_batch.len() + serialized.len() + 1;
        if self.add_count > 0
            && (self.add_count >= self.config.max_update_records
                || projected_len > self.config.max_update_size)
        {
            self.flush_adds().await?;
        }

        if !self.add_batch.is_empty() {
            self.add_batch.push(',');
        }
        self.add_batch.push_str(&serialized);
        self.add_count += 1;
        self.adds_total += 1;

        if self.add_count >= self.config.max_update_records
            || self.add_batch.len() >= self.config.max_update_size
        {
            self.flush_adds().await?;
        }

        if !no_commit
            && self.config.commit_interval > 0
            && sequence % self.config.commit_interval == 0
        {
            self.commit(None).await?;
        }

        Ok(())
    }

    /// Queue a deletion by document id.
    pub async fn delete(&mut self, id: &str) -> Result<(), PipelineError> {
        self.delete_batch.push(id.to_string());
        self.deletes_total += 1;
        if self.delete_batch.len() >= DELETE_BATCH_LIMIT {
            self.flush_deletes().await?;
        }
        Ok(())
    }

    /// Send pending batches and drain the background transport.
    pub async fn flush(&mut self) -> Result<(), PipelineError> {
        self.flush_adds().await?;
        self.flush_deletes().await?;
        self.transport.wait_idle().await?;
        Ok(())
    }

    /// Issue a commit and await it.
    pub async fn commit(&self, timeout: Option<Duration>) -> Result<(), PipelineError> {
        self.transport.submit(payloads::COMMIT.to_string(), timeout).await?;
        self.transport.wait_idle().await?;
        Ok(())
    }

    /// Total adds and deletes queued over the buffer's lifetime.
    pub fn total_written(&self) -> u64 {
        self.adds_total + self.deletes_total
    }

    async fn flush_adds(&mut self) -> Result<(), PipelineError> {
        if self.add_count == 0 {
            return Ok(());
        }
        let body = format!("[{}]", self.add_batch);
        debug!(
            records = self.add_count,
            bytes = body.len(),
            "Sending add batch"
        );
        self.add_batch.clear();
        self.add_count = 0;
        self.transport.submit(body, None).await?;
        Ok(())
    }

    async fn flush_deletes(&mut self) -> Result<(), PipelineError> {
        if self.delete_batch.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = self.delete_batch.drain(..).collect();
        debug!(ids = ids.len(), "Sending delete batch");
        self.transport.submit(payloads::delete_ids(&ids), None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_indexer_solr::TransportError;
    use std::sync::Mutex;

    struct RecordingTransport {
        bodies: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn bodies(&self) -> Vec<String> {
            self.bodies.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl UpdateTransport for RecordingTransport {
        async fn submit(
            &self,
            body: String,
            _timeout: Option<Duration>,
        ) -> Result<(), TransportError> {
            self.bodies.lock().unwrap().push(body);
            Ok(())
        }

        async fn wait_idle(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn doc(id: &str) -> IndexDocument {
        let mut doc = IndexDocument::new();
        doc.insert("id", id);
        doc
    }

    #[tokio::test]
    async fn test_record_count_ceiling_sends_batch() {
        let transport = RecordingTransport::new();
        let config = UpdateBufferConfig {
            max_update_records: 2,
            ..Default::default()
        };
        let mut buffer = UpdateBuffer::new(transport.clone(), config);

        buffer.add(doc("a"), 1, true).await.unwrap();
        assert!(transport.bodies().is_empty());
        buffer.add(doc("b"), 2, true).await.unwrap();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], "[{\"id\":\"a\"},{\"id\":\"b\"}]");
    }

    #[tokio::test]
    async fn test_byte_ceiling_never_exceeded() {
        let transport = RecordingTransport::new();
        let config = UpdateBufferConfig {
            max_update_records: 1000,
            max_update_size: 40,
            commit_interval: 0,
        };
        let mut buffer = UpdateBuffer::new(transport.clone(), config);

        for i in 0..10 {
            buffer.add(doc(&format!("rec{i}")), i + 1, true).await.unwrap();
        }
        buffer.flush().await.unwrap();

        for body in transport.bodies() {
            assert!(body.len() <= 42, "batch of {} bytes too large", body.len());
        }
    }

    #[tokio::test]
    async fn test_allfields_list_is_joined() {
        let transport = RecordingTransport::new();
        let mut buffer = UpdateBuffer::new(transport.clone(), UpdateBufferConfig::default());

        let mut document = doc("a");
        document.insert("allfields", serde_json::json!(["T", "A"]));
        buffer.add(document, 1, true).await.unwrap();
        buffer.flush().await.unwrap();

        let bodies = transport.bodies();
        assert!(bodies[0].contains("\"allfields\":\"T A\""));
    }

    #[tokio::test]
    async fn test_delete_batch_flushes_at_limit() {
        let transport = RecordingTransport::new();
        let mut buffer = UpdateBuffer::new(transport.clone(), UpdateBufferConfig::default());

        for i in 0..DELETE_BATCH_LIMIT {
            buffer.delete(&format!("id{i}")).await.unwrap();
        }

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].starts_with("{\"delete\":{\"id\":\"id0\"}"));
    }

    #[tokio::test]
    async fn test_commit_cadence() {
        let transport = RecordingTransport::new();
        let config = UpdateBufferConfig {
            max_update_records: 1000,
            max_update_size: 1024 * 1024,
            commit_interval: 2,
        };
        let mut buffer = UpdateBuffer::new(transport.clone(), config);

        for sequence in 1..=4 {
            buffer.add(doc(&format!("r{sequence}")), sequence, false).await.unwrap();
        }

        let commits = transport
            .bodies()
            .iter()
            .filter(|b| b.as_str() == payloads::COMMIT)
            .count();
        assert_eq!(commits, 2);
    }

    #[tokio::test]
    async fn test_no_commit_suppresses_cadence() {
        let transport = RecordingTransport::new();
        let config = UpdateBufferConfig {
            commit_interval: 1,
            ..Default::default()
        };
        let mut buffer = UpdateBuffer::new(transport.clone(), config);

        buffer.add(doc("a"), 1, true).await.unwrap();
        buffer.flush().await.unwrap();

        assert!(!transport.bodies().iter().any(|b| b == payloads::COMMIT));
    }

    #[tokio::test]
    async fn test_flush_sends_adds_then_deletes() {
        let transport = RecordingTransport::new();
        let mut buffer = UpdateBuffer::new(transport.clone(), UpdateBufferConfig::default());

        buffer.delete("gone").await.unwrap();
        buffer.add(doc("kept"), 1, true).await.unwrap();
        buffer.flush().await.unwrap();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].starts_with('['));
        assert!(bodies[1].starts_with("{\"delete\""));
        assert_eq!(buffer.total_written(), 2);
    }
}
