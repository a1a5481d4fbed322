use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Two-valued completion status of a mail protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("OK"),
            Status::No => f.write_str("NO"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },
    #[error("Login failed for {user}: {reason}")]
    Login { user: String, reason: String },
    #[error("{command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot read '{}': {source}", path.display())]
    Access {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Storage service rejected '{object}': {reason}")]
    Service { object: String, reason: String },
}

/// Where and as whom to log in to the mail server.
#[derive(Clone)]
pub struct MailServer {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for MailServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"*****")
            .finish()
    }
}

/// Opens authenticated sessions against a mail server.
#[async_trait]
pub trait MailConnector: Send + Sync {
    type Session: MailSession;

    /// Connects and logs in. Fails on network trouble or bad credentials.
    async fn connect(&self, server: &MailServer) -> Result<Self::Session, MailError>;
}

/// An authenticated mailbox session.
///
/// Commands report a [`Status`] instead of failing when the server answers
/// with a negative response, so callers decide how strict to be.
#[async_trait]
pub trait MailSession: Send {
    async fn select(&mut self, mailbox: &str) -> Result<Status, MailError>;

    /// Runs a search and returns the raw, whitespace-separated id listing.
    async fn search(&mut self, criteria: &str) -> Result<(Status, Vec<u8>), MailError>;

    /// Fetches one message by sequence number.
    async fn fetch(&mut self, id: u32, spec: &str) -> Result<(Status, Vec<u8>), MailError>;

    async fn logout(&mut self) -> Result<(), MailError>;
}

/// Object storage the photos are pushed to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the bucket (or equivalent) name, used for logging.
    fn bucket(&self) -> &str;

    async fn upload(&self, local: &Path, object_name: &str) -> Result<(), StorageError>;
}
