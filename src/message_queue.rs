/*!
 * # Message Queue
 *
 * Deferred-work plumbing for operations whose invocation is offloaded to
 * a background worker, chiefly monthly report generation (which may scan
 * a facility's whole catalog). The algorithms stay synchronous; only the
 * trigger goes through the queue.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Message queue errors.
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Message envelope for queue items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Message {
    pub fn new(topic: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            payload,
            timestamp: chrono::Utc::now(),
            retry_count: 0,
            max_retries: 3,
        }
    }
}

/// Message queue trait for different implementations.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;
    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;
    async fn nack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;
}

/// In-memory message queue implementation.
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    queues: Arc<Mutex<std::collections::HashMap<String, VecDeque<Message>>>>,
    max_size: usize,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_max_size(1000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(std::collections::HashMap::new())),
            max_size,
        }
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;
        let queue = queues
            .entry(message.topic.clone())
            .or_insert_with(VecDeque::new);

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;
        if let Some(queue) = queues.get_mut(topic) {
            Ok(queue.pop_front())
        } else {
            Ok(None)
        }
    }

    async fn ack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        // In-memory implementation doesn't need explicit acking
        Ok(())
    }

    async fn nack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        // In-memory implementation doesn't support nacking
        Ok(())
    }
}
