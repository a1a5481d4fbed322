//! Harvest module - ledger-backed mail and upload pipelines.
//!
//! This module provides the core of the photo harvester:
//! - **Traits**: [`HarvestSource`] and [`LedgerEntry`] for building pipelines
//! - **Ledger**: Durable, deduplicated JSON records via [`Ledger`]
//! - **Pipeline**: Paced async executor via [`HarvestPipeline`]
//! - **Harvesters**: [`MailHarvester`] (mailbox → disk) and
//!   [`UploadHarvester`] (disk → object storage)

pub mod header;
pub mod ledger;
pub mod mail;
pub mod photo;
pub mod pipeline;
pub mod traits;
pub mod upload;

// Re-export commonly used types
pub use traits::{ensure_ok, HarvestError, HarvestSource, LedgerEntry, LedgerError};

pub use ledger::Ledger;
pub use mail::MailHarvester;
pub use pipeline::{HarvestPipeline, HarvestStats, LedgerWriteMode};
pub use upload::UploadHarvester;
