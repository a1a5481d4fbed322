use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::harvest::LedgerWriteMode;
use crate::model::RESERVED_ENTRY_FIELDS;
use crate::traits::MailServer;

const DEFAULT_PACING_SECONDS: f64 = 0.2;

/// Process-wide configuration, built once at startup and passed by
/// reference into both harvesters.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mail: MailSettings,
    pub storage: StorageSettings,
    /// Directory attachments are written to and photos are uploaded from.
    pub work_dir: PathBuf,
    pub ledger_write_mode: LedgerWriteMode,
    pub log: LogSettings,
}

#[derive(Clone, Debug)]
pub struct MailSettings {
    pub server: MailServer,
    pub mailbox: String,
    /// Headers copied into every mail ledger entry.
    pub stored_headers: Vec<String>,
    pub parse_status_reports: bool,
    pub tracker_file: PathBuf,
    pub pacing: Duration,
}

#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub tracker_file: PathBuf,
    pub pacing: Duration,
}

#[derive(Clone, Debug)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

        let server = MailServer {
            host: required("IMAP_SERVER_ADDRESS")?,
            port: parse_or(&var, "IMAP_SERVER_PORT", 993)?,
            user: required("MAILBOX_ADDRESS")?,
            password: required("MAILBOX_PASSWORD")?,
        };
        let stored_headers: Vec<String> = var("STORED_EMAIL_METADATA")
            .map(|value| {
                value
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["subject".into(), "from".into(), "date".into()]);
        if let Some(name) = stored_headers
            .iter()
            .find(|name| RESERVED_ENTRY_FIELDS.contains(&name.as_str()))
        {
            bail!("STORED_EMAIL_METADATA cannot include '{name}', it is a reserved ledger field");
        }

        let mail = MailSettings {
            server,
            mailbox: var("MAILBOX_NAME").unwrap_or_else(|| "INBOX".to_string()),
            stored_headers,
            parse_status_reports: var("PARSE_STATUS_REPORTS")
                .map(|v| parse_flag(&v))
                .transpose()
                .context("PARSE_STATUS_REPORTS must be true or false")?
                .unwrap_or(true),
            tracker_file: var("MAIL_TRACKER_JSON_FILE")
                .unwrap_or_else(|| "mail_tracker.json".to_string())
                .into(),
            pacing: pacing(&var, "SLEEP_TIME_SECONDS_BETWEEN_EMAILS")?,
        };

        let storage = StorageSettings {
            bucket: required("S3_BUCKET_NAME")?,
            access_key_id: var("S3_USER_ACCESS_KEY_ID"),
            secret_access_key: var("S3_USER_SECRET_ACCESS_KEY"),
            region: var("AWS_REGION").unwrap_or_else(|| "eu-north-1".to_string()),
            endpoint_url: var("AWS_ENDPOINT_URL"),
            tracker_file: var("S3_TRACKER_JSON_FILE")
                .unwrap_or_else(|| "s3_tracker.json".to_string())
                .into(),
            pacing: pacing(&var, "SLEEP_TIME_SECONDS_BETWEEN_UPLOADS")?,
        };

        let ledger_write_mode = match var("LEDGER_WRITE_MODE") {
            Some(value) => value
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("LEDGER_WRITE_MODE is invalid")?,
            None => LedgerWriteMode::default(),
        };

        Ok(Self {
            mail,
            storage,
            work_dir: var("WORK_DIR").unwrap_or_else(|| ".".to_string()).into(),
            ledger_write_mode,
            log: LogSettings {
                level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                file: var("LOG_FILE").map(PathBuf::from),
            },
        })
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}

fn pacing<V>(var: &V, key: &str) -> Result<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    let seconds: f64 = parse_or(var, key, DEFAULT_PACING_SECONDS)?;
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("{key} must be a non-negative number of seconds"))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("'{other}' is not a boolean")),
    }
}
