use std::time::Instant;

use tracing::{error, info, instrument};

use crate::harvest::{HarvestError, HarvestStats, MailHarvester, UploadHarvester};
use crate::traits::{MailConnector, ObjectStore};

/// Which harvest stages a run includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    #[default]
    All,
    Mail,
    Upload,
}

impl Stage {
    fn includes_mail(self) -> bool {
        matches!(self, Stage::All | Stage::Mail)
    }

    fn includes_upload(self) -> bool {
        matches!(self, Stage::All | Stage::Upload)
    }
}

#[derive(Debug)]
pub struct StageOutcome {
    pub name: &'static str,
    pub duration_ms: u64,
    /// The stage's statistics, or its error chain rendered for logging.
    pub result: Result<HarvestStats, String>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<StageOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(|stage| stage.result.is_ok())
    }
}

/// Runs the mail stage, then the upload stage.
///
/// A failing stage is logged with its full error chain and does not stop the
/// next one, so photos already on disk are still pushed when the mailbox is
/// unreachable.
pub struct RunExecutor<C, O> {
    mail: MailHarvester<C>,
    upload: UploadHarvester<O>,
}

impl<C: MailConnector, O: ObjectStore> RunExecutor<C, O> {
    pub fn new(mail: MailHarvester<C>, upload: UploadHarvester<O>) -> Self {
        Self { mail, upload }
    }

    #[instrument(skip(self))]
    pub async fn execute(&self, scope: Stage) -> RunReport {
        let mut report = RunReport::default();

        if scope.includes_mail() {
            let start = Instant::now();
            let result = self.mail.harvest().await;
            report.stages.push(outcome("mail", start, result));
        }
        if scope.includes_upload() {
            let start = Instant::now();
            let result = self.upload.harvest().await;
            report.stages.push(outcome("upload", start, result));
        }

        info!(succeeded = report.succeeded(), "Run finished");
        report
    }
}

fn outcome(
    name: &'static str,
    start: Instant,
    result: Result<HarvestStats, HarvestError>,
) -> StageOutcome {
    let result = result.map_err(|e| {
        let chain = error_chain(&e);
        error!(stage = name, "Stage failed: {}", chain);
        chain
    });

    StageOutcome {
        name,
        duration_ms: start.elapsed().as_millis() as u64,
        result,
    }
}

/// Renders an error and all of its sources as `outer: inner: root`.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut rendered = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
