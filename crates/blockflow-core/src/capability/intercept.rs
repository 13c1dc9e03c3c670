use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// What an `interceptor` block hands to the hook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterceptEvent {
    pub block_id: String,
    pub label: Option<String>,
    pub params: Value,
}

pub trait Interceptor: Send + Sync {
    fn intercept(&self, event: InterceptEvent);
}

/// Interceptor that keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingInterceptor {
    events: Mutex<Vec<InterceptEvent>>,
}

impl RecordingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InterceptEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Params of every recorded event, optionally only those with `label`.
    pub fn params(&self, label: Option<&str>) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| label.is_none() || e.label.as_deref() == label)
            .map(|e| e.params)
            .collect()
    }
}

impl Interceptor for RecordingInterceptor {
    fn intercept(&self, event: InterceptEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
