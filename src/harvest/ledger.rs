//! JSON ledger of completed work items.

use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::harvest::traits::{LedgerEntry, LedgerError};

/// A ledger document: a pretty-printed JSON array of entries sorted by key.
///
/// The document is only ever replaced as a whole. Entries are never removed
/// or rewritten once recorded.
#[derive(Debug, Clone)]
pub struct Ledger<E> {
    path: PathBuf,
    label: &'static str,
    _entries: PhantomData<fn() -> E>,
}

impl<E: LedgerEntry> Ledger<E> {
    /// `label` names the ledger in log messages, e.g. `"mail"`.
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
            _entries: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries.
    ///
    /// A missing document is an empty ledger. A document that does not parse
    /// is logged as corrupt and also treated as empty, so everything is
    /// reprocessed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] for any other read failure.
    pub fn load(&self) -> Result<Vec<E>, LedgerError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No {} ledger yet", self.label);
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "The {} ledger was corrupt. Reprocessing everything.",
                    self.label
                );
                Ok(Vec::new())
            }
        }
    }

    /// Like [`load`](Self::load), but any failure means "no prior state".
    pub fn prior(&self) -> Vec<E> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Treating the {} ledger as empty", self.label);
            Vec::new()
        })
    }

    pub fn dedup_keys(&self) -> BTreeSet<E::Key> {
        keys(&self.prior())
    }

    /// Writes `previous` plus `new` back as the complete, sorted document.
    ///
    /// Nothing is written when `new` is empty. The content goes to a
    /// temporary file next to the ledger that is then renamed over it, so a
    /// failed write leaves the previous document untouched. On a key
    /// collision the entry from `previous` is kept.
    pub fn merge_and_save(&self, previous: &[E], new: &[E]) -> Result<(), LedgerError> {
        if new.is_empty() {
            return Ok(());
        }

        let mut merged: Vec<E> = previous.iter().chain(new).cloned().collect();
        merged.sort_by_key(|entry| entry.key());
        merged.dedup_by_key(|entry| entry.key());

        let mut json = serde_json::to_vec_pretty(&merged)?;
        json.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!(
            path = %self.path.display(),
            entries = merged.len(),
            added = new.len(),
            "Saved {} ledger",
            self.label
        );
        Ok(())
    }
}

/// Projects entries onto their dedup keys.
pub fn keys<E: LedgerEntry>(entries: &[E]) -> BTreeSet<E::Key> {
    entries.iter().map(|entry| entry.key()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, MailEntry, PhotoEntry};

    fn mail(id: u32) -> MailEntry {
        let mut entry = MailEntry::new(id);
        entry.headers.insert("subject".into(), format!("message {id}"));
        entry
    }

    fn photo(name: &str) -> PhotoEntry {
        PhotoEntry {
            filename: name.to_string(),
            size: "1.0KiB".to_string(),
            created: 1_633_407_164.0,
            processed: now(),
        }
    }

    #[test]
    fn test_load_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let ledger: Ledger<MailEntry> = Ledger::new(dir.path().join("mail.json"), "mail");

        assert!(ledger.load().unwrap().is_empty());
        assert!(ledger.dedup_keys().is_empty());
    }

    #[test]
    fn test_load_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        std::fs::write(&path, b"[{\"id\": 1, \"subj").unwrap();

        let ledger: Ledger<MailEntry> = Ledger::new(&path, "mail");
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s3.json");
        std::fs::write(&path, b"").unwrap();

        let ledger: Ledger<PhotoEntry> = Ledger::new(&path, "storage");
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_document_means_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let ledger: Ledger<MailEntry> = Ledger::new(dir.path(), "mail");

        assert!(matches!(ledger.load(), Err(LedgerError::Io { .. })));
        assert!(ledger.dedup_keys().is_empty());
    }

    #[test]
    fn test_merge_and_save_sorts_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let ledger: Ledger<MailEntry> = Ledger::new(dir.path().join("mail.json"), "mail");

        let previous = vec![mail(10), mail(2)];
        let new = vec![mail(7), mail(1)];
        ledger.merge_and_save(&previous, &new).unwrap();

        let loaded = ledger.load().unwrap();
        let ids: Vec<u32> = loaded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 7, 10]);
        assert_eq!(loaded[2], new[0]);
        assert_eq!(ledger.dedup_keys(), BTreeSet::from([1, 2, 7, 10]));
    }

    #[test]
    fn test_merge_and_save_keeps_previous_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let ledger: Ledger<PhotoEntry> = Ledger::new(dir.path().join("s3.json"), "storage");

        let previous = vec![photo("b.jpg")];
        let mut duplicate = photo("b.jpg");
        duplicate.size = "9.9MiB".to_string();
        ledger
            .merge_and_save(&previous, &[duplicate, photo("a.png")])
            .unwrap();

        let loaded = ledger.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].filename, "a.png");
        assert_eq!(loaded[1].size, "1.0KiB");
    }

    #[test]
    fn test_merge_and_save_without_new_entries_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        let ledger: Ledger<MailEntry> = Ledger::new(&path, "mail");

        ledger.merge_and_save(&[mail(1)], &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_merge_and_save_writes_readable_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        let ledger: Ledger<MailEntry> = Ledger::new(&path, "mail");

        let mut entry = mail(1);
        entry.headers.insert("subject".into(), "Hirvi äänessä".into());
        ledger.merge_and_save(&[], &[entry]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Hirvi äänessä"));
        assert!(text.starts_with("[\n  {"));
    }

    #[test]
    fn test_failed_save_leaves_document_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        let ledger: Ledger<MailEntry> = Ledger::new(&path, "mail");
        ledger.merge_and_save(&[], &[mail(1)]).unwrap();
        let before = std::fs::read(&path).unwrap();

        // The rename fails because the target is now a non-empty directory.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), &before).unwrap();
        assert!(ledger.merge_and_save(&[], &[mail(2)]).is_err());

        assert_eq!(std::fs::read(path.join("keep")).unwrap(), before);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary file must be cleaned up");
    }
}
