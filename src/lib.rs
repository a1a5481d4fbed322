pub mod config;
pub mod executor;
pub mod harvest;
pub mod imap;
pub mod logging;
pub mod model;
pub mod report;
pub mod s3;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export common types for convenience
pub use config::AppConfig;
pub use executor::{RunExecutor, RunReport, Stage, StageOutcome};
pub use model::*;
pub use traits::*;
