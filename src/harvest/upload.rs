//! Upload side of the harvest: local photos → object storage.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::config::AppConfig;
use crate::harvest::ledger::Ledger;
use crate::harvest::photo::is_supported_photo;
use crate::harvest::pipeline::{HarvestPipeline, HarvestStats, LedgerWriteMode};
use crate::harvest::traits::{HarvestError, HarvestSource};
use crate::model::{humanize_size, now, PhotoEntry};
use crate::traits::ObjectStore;

/// Pushes every photo in the working directory that the upload ledger does
/// not know about yet.
pub struct UploadHarvester<O> {
    store: O,
    work_dir: PathBuf,
    ledger: Ledger<PhotoEntry>,
    pacing: Duration,
    write_mode: LedgerWriteMode,
}

impl<O: ObjectStore> UploadHarvester<O> {
    pub fn new(store: O, config: &AppConfig) -> Self {
        Self {
            store,
            work_dir: config.work_dir.clone(),
            ledger: Ledger::new(&config.storage.tracker_file, "upload"),
            pacing: config.storage.pacing,
            write_mode: config.ledger_write_mode,
        }
    }

    /// Runs one pass over the working directory.
    ///
    /// A photo that fails to upload is logged and left for the next run; only
    /// an unreadable working directory or ledger fails the harvest.
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn harvest(&self) -> Result<HarvestStats, HarvestError> {
        info!("Pushing new photos to bucket: {}", self.store.bucket());

        let source = UploadSource {
            store: &self.store,
            work_dir: &self.work_dir,
        };
        HarvestPipeline::new(source, self.ledger.clone())
            .with_pacing(self.pacing)
            .with_write_mode(self.write_mode)
            .execute()
            .await
    }
}

/// Regular files in `dir` with a supported photo extension.
///
/// Symlinks are followed; names that are not valid UTF-8 are ignored.
pub async fn list_photos(dir: &Path) -> Result<BTreeSet<String>, HarvestError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| HarvestError::io(dir, e))?;

    let mut photos = BTreeSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HarvestError::io(dir, e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_supported_photo(&name) {
            continue;
        }
        if tokio::fs::metadata(entry.path())
            .await
            .is_ok_and(|m| m.is_file())
        {
            photos.insert(name);
        }
    }
    Ok(photos)
}

struct UploadSource<'a, O> {
    store: &'a O,
    work_dir: &'a Path,
}

#[async_trait]
impl<'a, O: ObjectStore> HarvestSource for UploadSource<'a, O> {
    type Entry = PhotoEntry;

    fn stage_name(&self) -> &'static str {
        "upload"
    }

    fn item_noun(&self) -> &'static str {
        "photos"
    }

    async fn discover(&mut self) -> Result<BTreeSet<String>, HarvestError> {
        list_photos(self.work_dir).await
    }

    async fn process(&mut self, filename: &String) -> Result<Option<PhotoEntry>, HarvestError> {
        match self.upload_photo(filename).await {
            Ok(entry) => Ok(Some(entry)),
            Err(e @ (HarvestError::Storage(_) | HarvestError::Io { .. })) => {
                error!(filename = %filename, error = %e, "Failed to upload photo");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<'a, O: ObjectStore> UploadSource<'a, O> {
    async fn upload_photo(&self, filename: &str) -> Result<PhotoEntry, HarvestError> {
        let path = self.work_dir.join(filename);
        self.store.upload(&path, filename).await?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| HarvestError::io(&path, e))?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_secs_f64())
            .unwrap_or_default();
        let size = humanize_size(metadata.len());

        info!("Uploaded '{}' ({}) to bucket {}.", filename, size, self.store.bucket());

        Ok(PhotoEntry {
            filename: filename.to_string(),
            size,
            created,
            processed: now(),
        })
    }
}
