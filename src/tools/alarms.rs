//! Device alarms from the monitoring API

use crate::error::BrainError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// One alarm row as returned by the monitoring API. Missing or null
/// fields read as empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceAlarm {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub component_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output: String,
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub total_above_threshold: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rank_text: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[async_trait]
pub trait AlarmSource: Send + Sync {
    /// All alarms of the client up to `end_time` (`YYYY-MM-DD`)
    async fn fetch(&self, client_hash: &str, end_time: &str) -> Result<Vec<DeviceAlarm>>;
}

pub struct HttpAlarmSource {
    client: Client,
    url: Option<String>,
}

impl HttpAlarmSource {
    pub fn new(client: Client, url: Option<String>) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlarmSource for HttpAlarmSource {
    async fn fetch(&self, client_hash: &str, end_time: &str) -> Result<Vec<DeviceAlarm>> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| BrainError::ToolError("ALARMS_API_URL is not set".to_string()))?;

        let response = self
            .client
            .post(url)
            .header("accept", "application/json")
            .json(&json!({ "client_hash": client_hash, "end_time": end_time }))
            .send()
            .await
            .map_err(|e| BrainError::ToolError(format!("Alarms API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BrainError::ToolError(format!(
                "Alarms API returned {}: {}",
                status, error_text
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| BrainError::ToolError(format!("Invalid JSON response: {}", e)))?;

        let alarms: Vec<DeviceAlarm> = serde_json::from_value(body)?;
        debug!(count = alarms.len(), end_time, "Alarms fetched");
        Ok(alarms)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Human-readable summary of the alarms of one device
pub fn format_alarms(device_name: &str, end_time: &str, alarms: &[&DeviceAlarm]) -> String {
    if alarms.is_empty() {
        return format!("No alarms found for device {} on {}.", device_name, end_time);
    }

    let blocks: Vec<String> = alarms
        .iter()
        .map(|alarm| {
            format!(
                "Component: {}\nVariable: {}\nStatus: {}\nPoints above threshold: {}\nRank: {}",
                alarm.component_name,
                alarm.output,
                display(&alarm.status),
                display(&alarm.total_above_threshold),
                alarm.rank_text
            )
        })
        .collect();

    format!(
        "Alarms found for device {} on {}:\n\n{}",
        device_name,
        end_time,
        blocks.join("\n\n")
    )
}
