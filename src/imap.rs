//! IMAP over implicit TLS, backing [`MailConnector`] and [`MailSession`].

use async_imap::error::Error as ImapError;
use async_imap::types::Fetch;
use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

use crate::traits::{MailConnector, MailError, MailServer, MailSession, Status};

type TlsSession = Session<TlsStream<Compat<TcpStream>>>;

/// Connects to real IMAP servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

#[async_trait]
impl MailConnector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, server: &MailServer) -> Result<ImapSession, MailError> {
        info!(host = %server.host, port = server.port, "Connecting to IMAP server");
        let connect_err = |reason: String| MailError::Connect {
            server: format!("{}:{}", server.host, server.port),
            reason,
        };

        let tcp = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|e| connect_err(format!("TCP connection failed: {e}")))?;
        let tls_stream = async_native_tls::TlsConnector::new()
            .connect(&server.host, tcp.compat())
            .await
            .map_err(|e| connect_err(format!("TLS handshake failed: {e}")))?;

        let session = async_imap::Client::new(tls_stream)
            .login(&server.user, &server.password)
            .await
            .map_err(|(e, _)| MailError::Login {
                user: server.user.clone(),
                reason: e.to_string(),
            })?;

        Ok(ImapSession { session })
    }
}

pub struct ImapSession {
    session: TlsSession,
}

/// Maps a negative server response to [`Status::No`] and anything else
/// (I/O, parse errors) to a command failure.
fn status_of<T>(command: &'static str, result: Result<T, ImapError>) -> Result<Option<T>, MailError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ImapError::No(reason)) | Err(ImapError::Bad(reason)) => {
            debug!(command, %reason, "Server refused command");
            Ok(None)
        }
        Err(e) => Err(MailError::Command {
            command,
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn select(&mut self, mailbox: &str) -> Result<Status, MailError> {
        let selected = status_of("SELECT", self.session.select(mailbox).await)?;
        Ok(if selected.is_some() { Status::Ok } else { Status::No })
    }

    async fn search(&mut self, criteria: &str) -> Result<(Status, Vec<u8>), MailError> {
        match status_of("SEARCH", self.session.search(criteria).await)? {
            Some(ids) => {
                let mut ids: Vec<u32> = ids.into_iter().collect();
                ids.sort_unstable();
                let listing: Vec<String> = ids.iter().map(u32::to_string).collect();
                Ok((Status::Ok, listing.join(" ").into_bytes()))
            }
            None => Ok((Status::No, Vec::new())),
        }
    }

    async fn fetch(&mut self, id: u32, spec: &str) -> Result<(Status, Vec<u8>), MailError> {
        let messages: Option<Vec<Fetch>> = match self.session.fetch(id.to_string(), spec).await {
            Ok(stream) => status_of("FETCH", stream.try_collect().await)?,
            Err(e) => status_of("FETCH", Err::<Vec<Fetch>, _>(e))?,
        };

        let body = messages
            .as_deref()
            .and_then(|fetched| fetched.iter().find_map(|f| f.body()))
            .map(<[u8]>::to_vec);
        match body {
            Some(raw) => Ok((Status::Ok, raw)),
            None => Ok((Status::No, Vec::new())),
        }
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        self.session
            .logout()
            .await
            .map_err(|e| MailError::Command {
                command: "LOGOUT",
                reason: e.to_string(),
            })
    }
}
