// Page ↔ worker message contract
//
// The page sends `{"type": "SKIP_WAITING"}` to a worker that finished
// installing. The worker also accepts the older `{"action": "skipWaiting"}`
// shape so pages still running a previous build can activate a new worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Leave the waiting state and activate now.
    SkipWaiting,
}

const LEGACY_ACTION_KEY: &str = "action";
const LEGACY_SKIP_WAITING: &str = "skipWaiting";

impl WorkerMessage {
    /// Recognise a message posted to the worker. Unknown shapes yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Ok(message) = serde_json::from_value::<WorkerMessage>(value.clone()) {
            return Some(message);
        }

        match value.get(LEGACY_ACTION_KEY).and_then(Value::as_str) {
            Some(LEGACY_SKIP_WAITING) => Some(WorkerMessage::SkipWaiting),
            _ => None,
        }
    }

    /// The canonical wire form.
    pub fn to_value(&self) -> Value {
        match self {
            WorkerMessage::SkipWaiting => serde_json::json!({ "type": "SKIP_WAITING" }),
        }
    }
}
