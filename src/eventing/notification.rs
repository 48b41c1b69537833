//! Notifications delivered to event stream subscribers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a notification, serialized in its wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ProviderReady,
    ConfigurationChange,
    KeepAlive,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ProviderReady => "provider_ready",
            NotificationType::ConfigurationChange => "configuration_change",
            NotificationType::KeepAlive => "keep_alive",
        }
    }
}

/// A typed event with an arbitrary structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Notification {
    pub fn new(kind: NotificationType, data: Map<String, Value>) -> Self {
        Self { kind, data }
    }

    pub fn provider_ready() -> Self {
        Self::new(NotificationType::ProviderReady, Map::new())
    }

    pub fn keep_alive() -> Self {
        Self::new(NotificationType::KeepAlive, Map::new())
    }

    pub fn configuration_change(data: Map<String, Value>) -> Self {
        Self::new(NotificationType::ConfigurationChange, data)
    }
}
