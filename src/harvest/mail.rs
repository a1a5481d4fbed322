//! Mailbox side of the harvest: new messages → attachments on disk.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::harvest::header::{decode_header, raw_header};
use crate::harvest::ledger::Ledger;
use crate::harvest::photo::{is_supported_photo, safe_child, SUPPORTED_IMAGE_EXTENSIONS};
use crate::harvest::pipeline::{HarvestPipeline, HarvestStats, LedgerWriteMode};
use crate::harvest::traits::{ensure_ok, HarvestError, HarvestSource};
use crate::model::{now, MailEntry};
use crate::report;
use crate::traits::{MailConnector, MailServer, MailSession};

/// Downloads photo attachments from every message not yet in the mail ledger.
pub struct MailHarvester<C> {
    connector: C,
    server: MailServer,
    mailbox: String,
    stored_headers: Vec<String>,
    parse_status_reports: bool,
    work_dir: PathBuf,
    ledger: Ledger<MailEntry>,
    pacing: Duration,
    write_mode: LedgerWriteMode,
}

impl<C: MailConnector> MailHarvester<C> {
    pub fn new(connector: C, config: &AppConfig) -> Self {
        Self {
            connector,
            server: config.mail.server.clone(),
            mailbox: config.mail.mailbox.clone(),
            stored_headers: config.mail.stored_headers.clone(),
            parse_status_reports: config.mail.parse_status_reports,
            work_dir: config.work_dir.clone(),
            ledger: Ledger::new(&config.mail.tracker_file, "email"),
            pacing: config.mail.pacing,
            write_mode: config.ledger_write_mode,
        }
    }

    /// Runs one pass over the whole mailbox.
    ///
    /// # Errors
    ///
    /// Connection, login and mailbox selection failures, non-OK protocol
    /// statuses and any failure while handling a message abort the harvest.
    #[instrument(skip(self), fields(mailbox = %self.server.user))]
    pub async fn harvest(&self) -> Result<HarvestStats, HarvestError> {
        info!("Reading mailbox: {}", self.server.user);

        let mut session = self.connector.connect(&self.server).await?;
        let status = session.select(&self.mailbox).await?;
        ensure_ok("SELECT", status)?;

        let source = MailSource {
            session,
            stored_headers: self.stored_headers.clone(),
            parse_status_reports: self.parse_status_reports,
            work_dir: self.work_dir.clone(),
        };
        let mut pipeline = HarvestPipeline::new(source, self.ledger.clone())
            .with_pacing(self.pacing)
            .with_write_mode(self.write_mode);

        let result = pipeline.execute().await;

        let mut session = pipeline.into_source().session;
        if let Err(e) = session.logout().await {
            warn!(error = %e, "Logout failed");
        }

        result
    }
}

/// Parses a SEARCH listing into message ids, ignoring anything non-numeric.
pub fn parse_message_ids(listing: &[u8]) -> BTreeSet<u32> {
    String::from_utf8_lossy(listing)
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

struct MailSource<S> {
    session: S,
    stored_headers: Vec<String>,
    parse_status_reports: bool,
    work_dir: PathBuf,
}

#[async_trait]
impl<S: MailSession> HarvestSource for MailSource<S> {
    type Entry = MailEntry;

    fn stage_name(&self) -> &'static str {
        "mail"
    }

    fn item_noun(&self) -> &'static str {
        "email messages"
    }

    async fn discover(&mut self) -> Result<BTreeSet<u32>, HarvestError> {
        let (status, listing) = self.session.search("ALL").await?;
        ensure_ok("SEARCH", status)?;

        if listing.iter().all(u8::is_ascii_whitespace) {
            info!("Mailbox is empty");
            return Ok(BTreeSet::new());
        }
        Ok(parse_message_ids(&listing))
    }

    async fn process(&mut self, id: &u32) -> Result<Option<MailEntry>, HarvestError> {
        let (status, raw) = self.session.fetch(*id, "RFC822").await?;
        ensure_ok("FETCH", status)?;

        let (mut entry, attachments) = self.extract(*id, &raw)?;
        for attachment in attachments {
            tokio::fs::write(&attachment.path, &attachment.contents)
                .await
                .map_err(|e| HarvestError::io(&attachment.path, e))?;
            info!(
                "Email from {} {} '{}': Downloaded attachment '{}'.",
                entry.header("from"),
                entry.header("date"),
                entry.header("subject"),
                attachment.filename
            );
            entry.downloads.push(attachment.filename);
        }

        entry.processed = now();
        Ok(Some(entry))
    }
}

/// A photo attachment ready to be written to the working directory.
struct Attachment {
    filename: String,
    path: PathBuf,
    contents: Vec<u8>,
}

impl<S> MailSource<S> {
    /// Parses one raw message into its ledger entry and the photos to save.
    fn extract(&self, id: u32, raw: &[u8]) -> Result<(MailEntry, Vec<Attachment>), HarvestError> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or(HarvestError::MalformedMessage { id })?;

        let mut entry = MailEntry::new(id);
        for name in &self.stored_headers {
            let value = raw_header(raw, name).unwrap_or_default();
            entry.headers.insert(name.clone(), decode_header(&value).text);
        }

        let mut attachments = Vec::new();
        self.collect_attachments(id, &message.parts, &mut attachments);

        if self.parse_status_reports {
            entry.status_report = message
                .body_text(0)
                .and_then(|body| report::extract(&body));
        }

        Ok((entry, attachments))
    }

    /// Walks a part tree, descending into encapsulated (forwarded) messages.
    fn collect_attachments(&self, id: u32, parts: &[MessagePart<'_>], out: &mut Vec<Attachment>) {
        for part in parts {
            match &part.body {
                PartType::Multipart(_) => continue,
                PartType::Message(inner) => {
                    self.collect_attachments(id, &inner.parts, out);
                    continue;
                }
                _ => {}
            }
            if part.content_disposition().is_none() {
                continue;
            }
            let filename = match part.attachment_name() {
                Some(name) if !name.is_empty() => name,
                _ => continue,
            };

            if !is_supported_photo(filename) {
                debug!(
                    "Skipping email attachment '{}' because it is not one of the supported types ({}).",
                    filename,
                    SUPPORTED_IMAGE_EXTENSIONS.join(", ")
                );
                continue;
            }
            let Some(path) = safe_child(&self.work_dir, filename) else {
                warn!(id, filename, "Refusing attachment name outside the working directory");
                continue;
            };

            out.push(Attachment {
                filename: filename.to_string(),
                path,
                contents: part.contents().to_vec(),
            });
        }
    }
}
