//! Ledger-backed harvest pipeline executor.
//!
//! This module provides the [`HarvestPipeline`] coordinator shared by the
//! mail and upload harvesters:
//! - Discovery of candidate keys and diffing against the [`Ledger`]
//! - Deterministic, paced processing of pending items
//! - Persisting new entries, at the end of the run or after every item
//! - Structured logging via `tracing`

use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::info;

use crate::harvest::ledger::{keys, Ledger};
use crate::harvest::traits::{HarvestError, HarvestSource, LedgerEntry};

// ============================================================================
// Pipeline Types
// ============================================================================

/// When new ledger entries are written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerWriteMode {
    /// One write after all pending items are processed. A crash mid-run
    /// loses the whole run's records, so those items are redone next run.
    #[default]
    EndOfRun,

    /// Write after every harvested item. A crash loses at most the item in
    /// flight.
    PerItem,
}

impl FromStr for LedgerWriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "end-of-run" => Ok(Self::EndOfRun),
            "per-item" => Ok(Self::PerItem),
            other => Err(format!(
                "unknown ledger write mode '{other}' (expected 'end-of-run' or 'per-item')"
            )),
        }
    }
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    /// Candidate keys found at the source
    pub discovered: usize,

    /// Candidates not yet in the ledger
    pub pending: usize,

    /// New ledger entries produced
    pub harvested: usize,

    /// Pending items that failed and were skipped
    pub skipped: usize,

    /// Total time spent on the run (milliseconds)
    pub duration_ms: u64,
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Runs a [`HarvestSource`] against its ledger.
///
/// 1. **Discovery**: ask the source for every candidate key
/// 2. **Diff**: drop keys already recorded in the ledger
/// 3. **Processing**: handle pending keys in ascending order, sleeping
///    `pacing` before each one
/// 4. **Persisting**: merge new entries into the ledger
///
/// An error from the source aborts the run. Entries already produced in that
/// run are then only durable in [`LedgerWriteMode::PerItem`].
pub struct HarvestPipeline<S>
where
    S: HarvestSource,
{
    source: S,
    ledger: Ledger<S::Entry>,
    pacing: Duration,
    write_mode: LedgerWriteMode,
}

impl<S> HarvestPipeline<S>
where
    S: HarvestSource,
{
    /// Creates a pipeline with no pacing and end-of-run ledger writes.
    pub fn new(source: S, ledger: Ledger<S::Entry>) -> Self {
        Self {
            source,
            ledger,
            pacing: Duration::ZERO,
            write_mode: LedgerWriteMode::EndOfRun,
        }
    }

    /// Sets the delay before each pending item.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_write_mode(mut self, write_mode: LedgerWriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Gives the source back, e.g. to close a session after the run.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Executes one harvest run.
    ///
    /// # Errors
    ///
    /// Returns the first error the source raises, or a [`HarvestError::Ledger`]
    /// if the ledger cannot be written.
    pub async fn execute(&mut self) -> Result<HarvestStats, HarvestError> {
        let start = Instant::now();
        let mut stats = HarvestStats::default();
        let stage = self.source.stage_name();

        let candidates = self.source.discover().await?;
        stats.discovered = candidates.len();
        if candidates.is_empty() {
            info!(stage, "Nothing to harvest");
            stats.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        let ledger = self.ledger.clone();
        let previous = tokio::task::spawn_blocking(move || ledger.prior()).await?;
        let pending = pending_keys(candidates, &previous);
        stats.pending = pending.len();
        info!(
            stage,
            "Found {} new {} to process.",
            pending.len(),
            self.source.item_noun()
        );

        let mut harvested: Vec<S::Entry> = Vec::new();
        for key in &pending {
            tokio::time::sleep(self.pacing).await;

            match self.source.process(key).await? {
                Some(entry) => {
                    harvested.push(entry);
                    if self.write_mode == LedgerWriteMode::PerItem {
                        self.save(&previous, &harvested).await?;
                    }
                }
                None => stats.skipped += 1,
            }
        }

        if self.write_mode == LedgerWriteMode::EndOfRun {
            self.save(&previous, &harvested).await?;
        }

        stats.harvested = harvested.len();
        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            stage,
            harvested = stats.harvested,
            skipped = stats.skipped,
            duration_ms = stats.duration_ms,
            ledger = %self.ledger.path().display(),
            "Harvest completed"
        );

        Ok(stats)
    }

    /// Merges `new` into the ledger on the blocking pool.
    async fn save(&self, previous: &[S::Entry], new: &[S::Entry]) -> Result<(), HarvestError> {
        if new.is_empty() {
            return Ok(());
        }
        let ledger = self.ledger.clone();
        let previous = previous.to_vec();
        let new = new.to_vec();

        tokio::task::spawn_blocking(move || ledger.merge_and_save(&previous, &new)).await??;
        Ok(())
    }
}

/// Candidates not yet recorded in `entries`, in iteration order.
pub fn pending_keys<E: LedgerEntry>(
    candidates: impl IntoIterator<Item = E::Key>,
    entries: &[E],
) -> Vec<E::Key> {
    let done = keys(entries);
    candidates
        .into_iter()
        .filter(|key| !done.contains(key))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
