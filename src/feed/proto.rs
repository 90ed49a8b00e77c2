use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Metrics;

/// Typed view of a feed message, decoded by consumers that care about shape.
///
/// The feed client itself delivers raw JSON; unknown or malformed variants
/// land in [`FeedEvent::Other`] rather than failing.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    KpiUpdate { data: Metrics },
    Pong { message: Option<String> },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedEvent {
    KpiUpdate {
        data: Metrics,
    },
    Pong {
        #[serde(default)]
        message: Option<String>,
    },
}

impl FeedEvent {
    pub fn from_value(value: &Value) -> Self {
        match TaggedEvent::deserialize(value) {
            Ok(TaggedEvent::KpiUpdate { data }) => Self::KpiUpdate { data },
            Ok(TaggedEvent::Pong { message }) => Self::Pong { message },
            Err(_) => Self::Other(value.clone()),
        }
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::KpiUpdate { .. } => Some("kpi_update"),
            Self::Pong { .. } => Some("pong"),
            Self::Other(value) => value.get("type").and_then(Value::as_str),
        }
    }
}

impl From<&Value> for FeedEvent {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

/// Outbound messages. The backend answers any text frame with a `pong`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_time_ms: Option<u64>,
    },
}
