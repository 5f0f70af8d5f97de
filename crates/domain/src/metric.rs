//! Metrics: readings a device publishes on its own, and how they map onto
//! outbound topics.

use serde::Deserialize;
use serde_json::Value;

/// A kind of reading a device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Temperature,
    Humidity,
    Energy,
    /// Aggregate of environment readings (`a1`).
    Sensors,
    /// Relay state of strips and wall sockets.
    State,
    /// Actuator position in percent.
    Position,
}

impl MetricKind {
    /// Every metric kind.
    pub const ALL: [Self; 6] = [
        Self::Temperature,
        Self::Humidity,
        Self::Energy,
        Self::Sensors,
        Self::State,
        Self::Position,
    ];

    /// Topic segment the aggregate value is published under.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Energy => "energy",
            Self::Sensors => "sensors",
            Self::State => "state",
            Self::Position => "position",
        }
    }

    /// Topic segment per-leaf values are published under, for structured
    /// metrics.
    #[must_use]
    pub fn leaf_topic(self) -> Option<&'static str> {
        match self {
            Self::Sensors => Some("sensor"),
            Self::State => Some("state"),
            _ => None,
        }
    }

    /// Whether an inbound command segment is one of the bridge's own
    /// telemetry topics.
    #[must_use]
    pub fn is_telemetry_topic(command: &str) -> bool {
        Self::ALL.iter().any(|kind| {
            command == kind.topic()
                || kind.leaf_topic().is_some_and(|leaf| {
                    command
                        .strip_prefix(leaf)
                        .is_some_and(|rest| rest.starts_with('/'))
                })
        })
    }
}

/// How a structured reading is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishFormat {
    /// One message per leaf value.
    #[default]
    Leaves,
    /// One JSON message with every leaf.
    Json,
}

/// A single outbound message produced from a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricMessage {
    /// Topic suffix relative to the device's topic base.
    pub suffix: String,
    /// Rendered payload.
    pub payload: String,
}

/// Turn a reading into the messages to publish.
#[must_use]
pub fn render(kind: MetricKind, value: &Value, format: PublishFormat) -> Vec<MetricMessage> {
    match (value, format, kind.leaf_topic()) {
        (Value::Object(fields), PublishFormat::Leaves, Some(leaf)) => fields
            .iter()
            .map(|(name, field)| MetricMessage {
                suffix: format!("{leaf}/{name}"),
                payload: render_scalar(field),
            })
            .collect(),
        _ => vec![MetricMessage {
            suffix: kind.topic().to_string(),
            payload: render_scalar(value),
        }],
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(true) => "on".to_string(),
        Value::Bool(false) => "off".to_string(),
        other => other.to_string(),
    }
}
