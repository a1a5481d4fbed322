//! Camera status reports.
//!
//! Burrel-style trail cameras periodically mail a plain-text report with
//! their identifier, signal, battery and SD card state, e.g.
//!
//! ```text
//! IMEI/MEID:866123456789012
//! Date:2021/10/05 07:12:44
//! CSQ:24, Battery:85%, Temp:12 Celsius Degree
//! Pics:37, Total:29.7GB, Free:28.9GB
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker that identifies a body as a device status report.
pub const DEVICE_MARKER: &str = "IMEI/MEID";

const DATE_KEY: &str = "Date";
const SIGNAL_KEY: &str = "CSQ";
const BATTERY_KEY: &str = "Battery";
const TEMPERATURE_KEY: &str = "Temp";
const PHOTOS_KEY: &str = "Pics";
const TOTAL_STORAGE_KEY: &str = "Total";
const FREE_STORAGE_KEY: &str = "Free";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub device_id: String,
    pub date: String,
    pub signal: String,
    pub battery: String,
    /// Numeric part only, the unit text is dropped.
    pub temperature: String,
    pub photos: String,
    pub total_storage: String,
    pub free_storage: String,
}

/// Splits a report body into its raw `key: value` fields.
///
/// Fields are separated by line breaks and commas; the key ends at the first
/// colon. Fields without a colon are ignored and later duplicates win.
pub fn fields(body: &str) -> HashMap<String, String> {
    body.lines()
        .flat_map(|line| line.split(','))
        .filter_map(|field| field.trim().split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parses a status report, or returns `None` when `body` is not one.
pub fn extract(body: &str) -> Option<StatusReport> {
    if !body.contains(DEVICE_MARKER) {
        return None;
    }

    let raw = fields(body);
    let get = |key: &str| raw.get(key).cloned().unwrap_or_default();

    Some(StatusReport {
        device_id: get(DEVICE_MARKER),
        date: get(DATE_KEY),
        signal: get(SIGNAL_KEY),
        battery: get(BATTERY_KEY),
        temperature: get(TEMPERATURE_KEY)
            .split(' ')
            .next()
            .unwrap_or_default()
            .to_string(),
        photos: get(PHOTOS_KEY),
        total_storage: get(TOTAL_STORAGE_KEY),
        free_storage: get(FREE_STORAGE_KEY),
    })
}
