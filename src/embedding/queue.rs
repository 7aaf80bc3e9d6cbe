//! Async embedding queue with batch processing
//!
//! Embeddings are computed off the critical path so record creation never
//! blocks on the model. A record is insertable without a vector and
//! becomes similarity-searchable once the worker writes one; callers must
//! not assume immediate searchability.

use async_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::Embedder;
use crate::error::{MemoryError, Result};
use crate::store::{queries, Store};
use crate::types::RecordId;

/// Message for the embedding queue
#[derive(Debug)]
pub struct EmbeddingRequest {
    pub record_id: RecordId,
    pub content: String,
}

/// Handle for enqueueing embedding work
pub struct EmbeddingQueue {
    sender: Sender<EmbeddingRequest>,
    receiver: Receiver<EmbeddingRequest>,
}

impl EmbeddingQueue {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(10_000);
        Self { sender, receiver }
    }

    pub async fn queue(&self, record_id: RecordId, content: String) -> Result<()> {
        self.sender
            .send(EmbeddingRequest { record_id, content })
            .await
            .map_err(|e| MemoryError::embedding("enqueue", format!("queue send error: {}", e)))
    }

    /// Blocking variant for sync contexts
    pub fn queue_blocking(&self, record_id: RecordId, content: String) -> Result<()> {
        self.sender
            .send_blocking(EmbeddingRequest { record_id, content })
            .map_err(|e| MemoryError::embedding("enqueue", format!("queue send error: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn receiver(&self) -> Receiver<EmbeddingRequest> {
        self.receiver.clone()
    }
}

impl Default for EmbeddingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EmbeddingQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

/// Background worker that drains the queue and persists vectors
pub struct EmbeddingWorker {
    embedder: Arc<dyn Embedder>,
    queue: EmbeddingQueue,
    store: Store,
    batch_size: usize,
    batch_timeout: Duration,
}

impl EmbeddingWorker {
    pub fn new(embedder: Arc<dyn Embedder>, queue: EmbeddingQueue, store: Store, batch_size: usize) -> Self {
        Self {
            embedder,
            queue,
            store,
            batch_size: batch_size.max(1),
            batch_timeout: Duration::from_millis(500),
        }
    }

    /// Requeue work left over from a previous process (pending rows and
    /// failed rows under the retry cap)
    pub fn requeue_pending(&self, max_retries: i32) -> Result<usize> {
        let pending = self
            .store
            .with_connection(|conn| queries::pending_embeddings(conn, max_retries))?;
        let count = pending.len();
        for (record_id, content) in pending {
            self.queue.queue_blocking(record_id, content)?;
        }
        Ok(count)
    }

    /// Run the worker loop (call in a spawned task)
    pub async fn run(&self) {
        let receiver = self.queue.receiver();
        let mut batch: Vec<EmbeddingRequest> = Vec::with_capacity(self.batch_size);
        let mut batch_timer = interval(self.batch_timeout);

        loop {
            tokio::select! {
                request = receiver.recv() => {
                    match request {
                        Ok(request) => {
                            batch.push(request);
                            if batch.len() >= self.batch_size {
                                self.process_batch(&mut batch);
                            }
                        }
                        // All senders dropped: drain what we have and stop
                        Err(_) => {
                            self.process_batch(&mut batch);
                            break;
                        }
                    }
                }

                _ = batch_timer.tick() => {
                    if !batch.is_empty() {
                        self.process_batch(&mut batch);
                    }
                }
            }
        }

        tracing::debug!("embedding worker stopped");
    }

    fn process_batch(&self, batch: &mut Vec<EmbeddingRequest>) {
        if batch.is_empty() {
            return;
        }

        let contents: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();

        let mark = self.store.with_connection(|conn| {
            for request in batch.iter() {
                queries::mark_embedding_processing(conn, &request.record_id)?;
            }
            Ok(())
        });
        if let Err(e) = mark {
            tracing::warn!(error = %e, "could not mark embedding batch as processing");
        }

        match self.embedder.embed_batch(&contents) {
            Ok(embeddings) => {
                let dims = self.embedder.dimensions();
                let model = self.embedder.model_name();

                let write = self.store.with_connection(|conn| {
                    for (request, embedding) in batch.iter().zip(embeddings.iter()) {
                        match queries::set_embedding(conn, &request.record_id, embedding, model, dims) {
                            Ok(_) => queries::mark_embedding_complete(conn, &request.record_id)?,
                            Err(e) => {
                                queries::mark_embedding_failed(
                                    conn,
                                    &request.record_id,
                                    &e.to_string(),
                                )?;
                            }
                        }
                    }
                    Ok(())
                });

                match write {
                    Ok(()) => tracing::info!(count = batch.len(), "processed embedding batch"),
                    Err(e) => tracing::error!(error = %e, "embedding batch write failed"),
                }
            }
            Err(e) => {
                let message = e.to_string();
                let _ = self.store.with_connection(|conn| {
                    for request in batch.iter() {
                        queries::mark_embedding_failed(conn, &request.record_id, &message)?;
                    }
                    Ok(())
                });
                tracing::error!(error = %message, "embedding batch failed");
            }
        }

        batch.clear();
    }
}
