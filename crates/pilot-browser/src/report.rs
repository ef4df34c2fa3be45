//! Test reporting.
//!
//! A [`ReportSink`] opens one [`Reporter`] per test. The reporter records
//! steps, attachments and the final outcome. [`AllureSink`] writes
//! Allure-compatible result files (`<uuid>-result.json` plus attachment files)
//! that the Allure CLI can render.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pilot_config::BrowserType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BrowserError, Result};

/// Final result of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// The test body or an assertion failed.
    Failed { message: String },
    /// Setup or infrastructure failed before the body could run.
    Broken { message: String },
    Skipped { reason: String },
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    /// True for `Failed` and `Broken`.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Failed { .. } | TestOutcome::Broken { .. })
    }

    pub fn status(&self) -> Status {
        match self {
            TestOutcome::Passed => Status::Passed,
            TestOutcome::Failed { .. } => Status::Failed,
            TestOutcome::Broken { .. } => Status::Broken,
            TestOutcome::Skipped { .. } => Status::Skipped,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TestOutcome::Passed => None,
            TestOutcome::Failed { message } | TestOutcome::Broken { message } => Some(message),
            TestOutcome::Skipped { reason } => Some(reason),
        }
    }

    /// Converts into a `Result` so a `#[tokio::test]` can propagate failures.
    ///
    /// # Errors
    ///
    /// Returns the outcome message for `Failed` and `Broken`.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self {
            TestOutcome::Failed { message } | TestOutcome::Broken { message } => {
                Err(anyhow::anyhow!(message))
            }
            TestOutcome::Passed | TestOutcome::Skipped { .. } => Ok(()),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.status()),
            None => write!(f, "{}", self.status()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Broken,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Broken => "broken",
            Status::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Identity of a test as seen by reporters.
#[derive(Debug, Clone)]
pub struct TestInfo {
    pub name: String,
    pub full_name: String,
    pub browser: BrowserType,
    pub correlation_id: String,
    pub labels: Vec<(String, String)>,
}

impl TestInfo {
    pub fn new(name: impl Into<String>, browser: BrowserType, correlation_id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            browser,
            correlation_id: correlation_id.into(),
            labels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    #[must_use]
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((name.into(), value.into()));
        self
    }
}

/// Handle of a step opened with [`Reporter::step_started`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(pub usize);

/// Per-test report recorder.
///
/// Steps are addressed by id, so steps running concurrently on clones of one
/// session keep their own nesting and status.
pub trait Reporter: Send + Sync {
    /// Opens a step under `parent`, or at the top level.
    fn step_started(&self, name: &str, parent: Option<StepId>) -> StepId;

    /// Closes `step`. Unknown or already closed ids are ignored.
    fn step_finished(&self, step: StepId, status: Status, message: Option<&str>);

    /// Attaches content to `step`, or to the test itself.
    fn attach(&self, step: Option<StepId>, name: &str, content_type: &str, data: &[u8])
    -> Result<()>;

    /// Records the outcome and flushes the report.
    fn finish(&self, outcome: &TestOutcome) -> Result<()>;
}

/// Opens a reporter for each test.
pub trait ReportSink: Send + Sync {
    fn open(&self, test: &TestInfo) -> Result<Arc<dyn Reporter>>;
}

/// Sink used when reporting is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSink;

impl ReportSink for DisabledSink {
    fn open(&self, _test: &TestInfo) -> Result<Arc<dyn Reporter>> {
        Ok(Arc::new(NoopReporter))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn step_started(&self, _name: &str, _parent: Option<StepId>) -> StepId {
        StepId(0)
    }

    fn step_finished(&self, _step: StepId, _status: Status, _message: Option<&str>) {}

    fn attach(
        &self,
        _step: Option<StepId>,
        _name: &str,
        _content_type: &str,
        _data: &[u8],
    ) -> Result<()> {
        Ok(())
    }

    fn finish(&self, _outcome: &TestOutcome) -> Result<()> {
        Ok(())
    }
}

/// Writes Allure result files into a results directory.
#[derive(Debug, Clone)]
pub struct AllureSink {
    results_dir: PathBuf,
}

impl AllureSink {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }
}

impl ReportSink for AllureSink {
    fn open(&self, test: &TestInfo) -> Result<Arc<dyn Reporter>> {
        std::fs::create_dir_all(&self.results_dir)?;
        Ok(Arc::new(AllureReporter::new(self.results_dir.clone(), test)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureResult {
    pub uuid: String,
    pub history_id: String,
    pub name: String,
    pub full_name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: String,
    pub start: i64,
    pub stop: i64,
    pub labels: Vec<Label>,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDetails {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: String,
    pub start: i64,
    pub stop: i64,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

struct StepNode {
    parent: Option<StepId>,
    open: bool,
    result: StepResult,
}

impl StepNode {
    fn close(&mut self, status: Status, message: Option<&str>) {
        self.open = false;
        self.result.status = status;
        self.result.stage = "finished".to_string();
        self.result.stop = now_millis();
        self.result.status_details = message.map(|m| StatusDetails {
            message: m.to_string(),
        });
    }
}

struct AllureState {
    result: AllureResult,
    /// Every step of the test, indexed by `StepId`. Parents precede children.
    steps: Vec<StepNode>,
    finished: bool,
}

pub struct AllureReporter {
    results_dir: PathBuf,
    state: Mutex<AllureState>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "text/html" => "html",
        "text/plain" => "txt",
        "application/json" => "json",
        _ => "bin",
    }
}

impl AllureReporter {
    fn new(results_dir: PathBuf, test: &TestInfo) -> Self {
        let mut labels = vec![
            Label {
                name: "browser".to_string(),
                value: test.browser.to_string(),
            },
            Label {
                name: "correlation_id".to_string(),
                value: test.correlation_id.clone(),
            },
            Label {
                name: "framework".to_string(),
                value: "pilot".to_string(),
            },
        ];
        labels.extend(test.labels.iter().map(|(name, value)| Label {
            name: name.clone(),
            value: value.clone(),
        }));

        let start = now_millis();
        let result = AllureResult {
            uuid: uuid::Uuid::new_v4().to_string(),
            history_id: format!("{}:{}", test.full_name, test.browser),
            name: test.name.clone(),
            full_name: test.full_name.clone(),
            status: Status::Passed,
            status_details: None,
            stage: "running".to_string(),
            start,
            stop: start,
            labels,
            steps: Vec::new(),
            attachments: Vec::new(),
        };

        Self {
            results_dir,
            state: Mutex::new(AllureState {
                result,
                steps: Vec::new(),
                finished: false,
            }),
        }
    }

    /// Folds the flat step list into the nested tree Allure expects,
    /// keeping start order among siblings.
    fn assemble(nodes: Vec<StepNode>) -> Vec<StepResult> {
        let mut slots: Vec<Option<StepNode>> = nodes.into_iter().map(Some).collect();
        let mut roots = Vec::new();

        for index in (0..slots.len()).rev() {
            let Some(node) = slots[index].take() else {
                continue;
            };
            match node.parent.filter(|parent| parent.0 < index) {
                Some(parent) => {
                    if let Some(parent) = slots[parent.0].as_mut() {
                        parent.result.steps.insert(0, node.result);
                    }
                }
                None => roots.insert(0, node.result),
            }
        }
        roots
    }
}

impl Reporter for AllureReporter {
    fn step_started(&self, name: &str, parent: Option<StepId>) -> StepId {
        let mut state = self.state.lock();
        let id = StepId(state.steps.len());
        let parent = parent.filter(|parent| parent.0 < id.0);
        state.steps.push(StepNode {
            parent,
            open: true,
            result: StepResult {
                name: name.to_string(),
                status: Status::Passed,
                status_details: None,
                stage: "running".to_string(),
                start: now_millis(),
                stop: 0,
                steps: Vec::new(),
                attachments: Vec::new(),
            },
        });
        id
    }

    fn step_finished(&self, step: StepId, status: Status, message: Option<&str>) {
        let mut state = self.state.lock();
        match state.steps.get_mut(step.0) {
            Some(node) if node.open => node.close(status, message),
            _ => debug!(step = step.0, "ignoring finish for unknown or closed step"),
        }
    }

    fn attach(
        &self,
        step: Option<StepId>,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<()> {
        let source = format!(
            "{}-attachment.{}",
            uuid::Uuid::new_v4(),
            extension_for(content_type)
        );
        std::fs::write(self.results_dir.join(&source), data)?;

        let attachment = Attachment {
            name: name.to_string(),
            source,
            content_type: content_type.to_string(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match step.and_then(|id| state.steps.get_mut(id.0)) {
            Some(node) => node.result.attachments.push(attachment),
            None => state.result.attachments.push(attachment),
        }
        Ok(())
    }

    fn finish(&self, outcome: &TestOutcome) -> Result<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(BrowserError::Report("report already finished".to_string()));
        }

        for node in state.steps.iter_mut().filter(|node| node.open) {
            node.close(Status::Broken, Some("step left open"));
        }
        let nodes = std::mem::take(&mut state.steps);
        state.result.steps = Self::assemble(nodes);

        state.result.status = outcome.status();
        state.result.status_details = outcome.message().map(|m| StatusDetails {
            message: m.to_string(),
        });
        state.result.stage = "finished".to_string();
        state.result.stop = now_millis();
        state.finished = true;

        let path = self
            .results_dir
            .join(format!("{}-result.json", state.result.uuid));
        let json = serde_json::to_vec_pretty(&state.result)?;
        std::fs::write(&path, json)?;

        debug!(path = %path.display(), status = %state.result.status, "report written");
        Ok(())
    }
}
