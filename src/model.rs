use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::report::StatusReport;

/// Top-level `MailEntry` keys that stored headers must not shadow.
pub const RESERVED_ENTRY_FIELDS: &[&str] = &["id", "downloads", "status_report", "processed"];

/// One fully processed email, as recorded in the mail ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailEntry {
    /// Mailbox sequence number; the ledger key.
    pub id: u32,

    /// Decoded header values keyed by header name (`subject`, `from`, `date`).
    #[serde(flatten)]
    pub headers: BTreeMap<String, String>,

    /// Attachments written to disk, in message order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_report: Option<StatusReport>,

    #[serde(with = "timestamp")]
    pub processed: NaiveDateTime,
}

impl MailEntry {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            headers: BTreeMap::new(),
            downloads: Vec::new(),
            status_report: None,
            processed: now(),
        }
    }

    /// Returns a decoded header value, or `""` when it was not recorded.
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).map(String::as_str).unwrap_or("")
    }
}

/// One fully uploaded photo, as recorded in the storage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoEntry {
    /// File name in the working directory; also the object name. The ledger key.
    pub filename: String,

    /// Human-readable size, e.g. `"1.5MiB"`.
    pub size: String,

    /// Creation time in seconds since the Unix epoch.
    pub created: f64,

    #[serde(with = "timestamp")]
    pub processed: NaiveDateTime,
}

/// Current local wall-clock time at ledger precision, used to stamp `processed`.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

const SIZE_UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Formats a byte count with binary prefixes and one decimal place.
pub fn humanize_size(num_bytes: u64) -> String {
    let mut value = num_bytes as f64;
    for unit in SIZE_UNITS {
        if value.abs() < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YiB")
}

/// Ledger timestamps: `2021-10-05 07:12:44.123456`.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(serde::de::Error::custom)
    }
}
