use crate::errors::{QueueError, Result};
use chrono::{DateTime, FixedOffset, Local, SubsecRound};
use serde::{Deserialize, Serialize};

/// Status recorded when the probe never produced a result.
pub const STATUS_NOT_COMPLETED: u16 = 0;
/// Status recorded when the endpoint could not be reached (DNS, refused, TLS).
pub const STATUS_CONNECTION_FAILED: u16 = 503;
/// Status recorded when the probe exceeded its timeout.
pub const STATUS_TIMEOUT: u16 = 504;
/// Response time recorded when no response was obtained.
pub const NO_RESPONSE_TIME: f64 = -1.0;

/// One web health probe result.
///
/// The JSON form is the queue wire format: a flat object with the keys `time`,
/// `web_url`, `http_status`, `resp_time` and `regex_match`, no envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "time", with = "timestamp_format")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "web_url")]
    pub url: String,
    pub http_status: u16,
    #[serde(rename = "resp_time")]
    pub response_time_seconds: f64,
    #[serde(rename = "regex_match", alias = "pattern_match", default)]
    pub pattern_match: Option<bool>,
}

impl Sample {
    /// A sample for `url` captured now, holding the "not completed" sentinels.
    pub fn pending(url: impl Into<String>) -> Self {
        Self::pending_at(url, Local::now().fixed_offset())
    }

    pub fn pending_at(url: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Sample {
            timestamp: timestamp.trunc_subsecs(6),
            url: url.into(),
            http_status: STATUS_NOT_COMPLETED,
            response_time_seconds: NO_RESPONSE_TIME,
            pattern_match: None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.http_status == STATUS_TIMEOUT
    }

    pub fn responded(&self) -> bool {
        self.response_time_seconds >= 0.0
    }

    /// Encodes the sample as a UTF-8 JSON queue message.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        if self.url.is_empty() {
            return Err(QueueError::SerializationFailed("sample has an empty url".into()).into());
        }
        if !self.response_time_seconds.is_finite() {
            return Err(QueueError::SerializationFailed(
                format!("non-finite response time {}", self.response_time_seconds).into(),
            )
            .into());
        }
        serde_json::to_vec(self).map_err(|e| QueueError::SerializationFailed(e.into()).into())
    }

    /// Decodes a queue message back into a sample.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let sample: Sample = serde_json::from_slice(payload)
            .map_err(|e| QueueError::DeserializationFailed(e.into()))?;
        if sample.url.is_empty() {
            return Err(
                QueueError::DeserializationFailed("message has an empty web_url".into()).into(),
            );
        }
        Ok(sample)
    }
}

pub(crate) mod timestamp_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%z";

    // `%.f` consumes nothing when the fraction is absent, `%z` takes both +HHMM and +HH:MM.
    const ACCEPTED: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];

    pub fn serialize<S>(value: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<FixedOffset>, String> {
        ACCEPTED
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
            .ok_or_else(|| format!("unrecognised timestamp `{raw}`"))
    }
}
