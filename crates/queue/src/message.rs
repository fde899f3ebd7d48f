//! Wire types carried by the queue.

use biopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// Payload of one task: which job to run and how.
///
/// Serialized as `{"job_id": ..., "job_type": ..., "parameters": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub job_id: DbId,
    pub job_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl TaskMessage {
    pub fn new(job_id: DbId, job_type: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            job_id,
            job_type: job_type.into(),
            parameters,
        }
    }
}

/// A message handed to one consumer, leased until acked or expired.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-side message id. Stable across redeliveries.
    pub message_id: DbId,
    pub message: TaskMessage,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: i32,
    pub enqueued_at: Timestamp,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biopilot_core::types::new_id;
    use serde_json::json;

    #[test]
    fn wire_format_is_flat_json() {
        let job_id = new_id();
        let msg = TaskMessage::new(job_id, "demo", json!({"n": 1}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"job_id": job_id, "job_type": "demo", "parameters": {"n": 1}})
        );
    }

    #[test]
    fn missing_parameters_default_to_null() {
        let job_id = new_id();
        let raw = format!(r#"{{"job_id":"{job_id}","job_type":"demo"}}"#);
        let msg: TaskMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.parameters, serde_json::Value::Null);
    }
}
