//! In-memory collaborators and fixtures for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;

use crate::config::AppConfig;
use crate::traits::{
    MailConnector, MailError, MailServer, MailSession, ObjectStore, Status, StorageError,
};

/// Configuration pointing every file at `dir`, with no pacing.
pub fn config_in(dir: &Path) -> AppConfig {
    let vars = [
        ("IMAP_SERVER_ADDRESS", "imap.example.com"),
        ("MAILBOX_ADDRESS", "trailcam@example.com"),
        ("MAILBOX_PASSWORD", "hunter2"),
        ("S3_BUCKET_NAME", "trailcam-photos"),
        ("SLEEP_TIME_SECONDS_BETWEEN_EMAILS", "0"),
        ("SLEEP_TIME_SECONDS_BETWEEN_UPLOADS", "0"),
    ];
    let mut config = AppConfig::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    config.work_dir = dir.join("photos");
    config.mail.tracker_file = dir.join("mail_tracker.json");
    config.storage.tracker_file = dir.join("s3_tracker.json");
    std::fs::create_dir_all(&config.work_dir).unwrap();
    config
}

/// A multipart message with a text body and base64 attachments.
pub fn message(subject: &str, body: &str, attachments: &[(&str, &[u8])]) -> Vec<u8> {
    let mut raw = format!(
        "From: Trail Cam <cam@example.com>\r\n\
         Date: Tue, 5 Oct 2021 07:12:44 +0300\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"XXBOUNDARY\"\r\n\
         \r\n\
         --XXBOUNDARY\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    );
    for (name, content) in attachments {
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        raw.push_str(&format!(
            "--XXBOUNDARY\r\n\
             Content-Type: application/octet-stream; name=\"{name}\"\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {encoded}\r\n"
        ));
    }
    raw.push_str("--XXBOUNDARY--\r\n");
    raw.into_bytes()
}

#[derive(Debug)]
pub struct MailboxState {
    pub messages: BTreeMap<u32, Vec<u8>>,
    /// Replaces the listing derived from `messages` when set.
    pub listing: Option<Vec<u8>>,
    pub select_status: Status,
    pub search_status: Status,
    pub failing_fetches: BTreeSet<u32>,
    pub reject_login: bool,
    pub fetched: Vec<u32>,
    pub logged_out: bool,
}

/// Mail server double; clones share the same mailbox.
#[derive(Debug, Clone)]
pub struct FakeMailbox {
    pub state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MailboxState {
                messages: BTreeMap::new(),
                listing: None,
                select_status: Status::Ok,
                search_status: Status::Ok,
                failing_fetches: BTreeSet::new(),
                reject_login: false,
                fetched: Vec::new(),
                logged_out: false,
            })),
        }
    }

    pub fn with_message(self, id: u32, raw: Vec<u8>) -> Self {
        self.state.lock().unwrap().messages.insert(id, raw);
        self
    }

    pub fn fetched(&self) -> Vec<u32> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl MailConnector for FakeMailbox {
    type Session = FakeMailbox;

    async fn connect(&self, server: &MailServer) -> Result<FakeMailbox, MailError> {
        if self.state.lock().unwrap().reject_login {
            return Err(MailError::Login {
                user: server.user.clone(),
                reason: "authentication failed".to_string(),
            });
        }
        Ok(self.clone())
    }
}

#[async_trait]
impl MailSession for FakeMailbox {
    async fn select(&mut self, _mailbox: &str) -> Result<Status, MailError> {
        Ok(self.state.lock().unwrap().select_status)
    }

    async fn search(&mut self, _criteria: &str) -> Result<(Status, Vec<u8>), MailError> {
        let state = self.state.lock().unwrap();
        let listing = state.listing.clone().unwrap_or_else(|| {
            let ids: Vec<String> = state.messages.keys().map(u32::to_string).collect();
            ids.join(" ").into_bytes()
        });
        Ok((state.search_status, listing))
    }

    async fn fetch(&mut self, id: u32, _spec: &str) -> Result<(Status, Vec<u8>), MailError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(id);
        if state.failing_fetches.contains(&id) {
            return Ok((Status::No, Vec::new()));
        }
        match state.messages.get(&id) {
            Some(raw) => Ok((Status::Ok, raw.clone())),
            None => Ok((Status::No, Vec::new())),
        }
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        self.state.lock().unwrap().logged_out = true;
        Ok(())
    }
}

/// Object store double that records uploads and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    pub uploaded: Arc<Mutex<Vec<String>>>,
    pub failing: BTreeSet<String>,
}

impl FakeStore {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn bucket(&self) -> &str {
        "fake-bucket"
    }

    async fn upload(&self, local: &Path, object_name: &str) -> Result<(), StorageError> {
        tokio::fs::read(local)
            .await
            .map_err(|source| StorageError::Access {
                path: local.to_path_buf(),
                source,
            })?;
        if self.failing.contains(object_name) {
            return Err(StorageError::Service {
                object: object_name.to_string(),
                reason: "AccessDenied".to_string(),
            });
        }
        self.uploaded.lock().unwrap().push(object_name.to_string());
        Ok(())
    }
}
