//! Intent routing
//!
//! Maps the classifier's label onto the tool that answers the message.
//! Anything unrecognised goes to the general energy agent.

use crate::models::AgentReply;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CLASSIFIER_AGENT: &str = "intent_classifier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    UserManual,
    DeviceAlarms,
    EnergyOnly,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::UserManual, Intent::DeviceAlarms, Intent::EnergyOnly];

    pub fn from_label(label: &str) -> Intent {
        match label.trim().trim_matches('"').to_lowercase().as_str() {
            "user_manual" => Intent::UserManual,
            "device_alarms" => Intent::DeviceAlarms,
            _ => Intent::EnergyOnly,
        }
    }

    /// Read the label from a classifier reply: the structured `intent`
    /// field, or a text reply holding either JSON or the bare label
    pub fn from_reply(reply: &AgentReply) -> Intent {
        match reply {
            AgentReply::Structured(_) => reply
                .field("intent")
                .map(Intent::from_label)
                .unwrap_or(Intent::EnergyOnly),
            AgentReply::Text(text) => match serde_json::from_str::<serde_json::Value>(text.trim()) {
                Ok(value) if value.is_object() => {
                    Intent::from_reply(&AgentReply::Structured(value))
                }
                _ => Intent::from_label(text),
            },
        }
    }

    /// Name of the agent (and tool) that serves this intent
    pub fn agent_name(&self) -> &'static str {
        match self {
            Intent::UserManual => "user_manual",
            Intent::DeviceAlarms => "device_alarms",
            Intent::EnergyOnly => "energy_only",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.agent_name())
    }
}
