//! In-memory test doubles.
//!
//! [`FakeDriver`] and [`FakeElement`] implement the driver traits over plain
//! state so page objects, waits and the harness can be exercised without a
//! browser. Failures are injected per call kind. [`FakeFactory`] plugs the
//! fake into a [`BrowserFactoryRegistry`](crate::BrowserFactoryRegistry) and
//! [`RecordingSink`] captures everything a test reports.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_config::BrowserType;
use serde_json::Value;

use crate::driver::{By, ElementHandle, WebDriver, WebElement};
use crate::error::{BrowserError, Result};
use crate::factory::BrowserFactory;
use crate::options::BrowserOptions;
use crate::report::{ReportSink, Reporter, Status, StepId, TestInfo, TestOutcome};

/// PNG signature returned as screenshot bytes.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Driver calls that can be recorded and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    Navigate,
    PageSource,
    ExecuteScript,
    Screenshot,
    BrowserVersion,
    SetImplicitWait,
    Close,
    Quit,
    Dispose,
}

fn injected(call: FakeCall) -> BrowserError {
    BrowserError::ConnectionFailed(format!("injected {call:?} failure"))
}

#[derive(Debug)]
struct ElementState {
    text: String,
    value: String,
    attributes: HashMap<String, String>,
    displayed: bool,
    enabled: bool,
    attached: bool,
    clicks: u32,
    failing_clicks: u32,
    children: HashMap<By, Vec<ElementHandle>>,
    functions: Vec<String>,
}

/// Scriptable element.
pub struct FakeElement {
    name: String,
    state: Mutex<ElementState>,
}

impl FakeElement {
    /// A visible, enabled, attached element with no text.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(ElementState {
                text: String::new(),
                value: String::new(),
                attributes: HashMap::new(),
                displayed: true,
                enabled: true,
                attached: true,
                clicks: 0,
                failing_clicks: 0,
                children: HashMap::new(),
                functions: Vec::new(),
            }),
        })
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Arc<Self> {
        let element = Self::new(name);
        element.set_text(text);
        element
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.state.lock().text = text.into();
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state.lock().attributes.insert(name.into(), value.into());
    }

    pub fn set_displayed(&self, displayed: bool) {
        self.state.lock().displayed = displayed;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    /// Removes the element from the fake document; later calls fail as stale.
    pub fn detach(&self) {
        self.state.lock().attached = false;
    }

    /// The next `count` clicks fail with `ElementNotInteractable`.
    pub fn fail_next_clicks(&self, count: u32) {
        self.state.lock().failing_clicks = count;
    }

    pub fn add_child(&self, by: By, child: Arc<FakeElement>) {
        self.state
            .lock()
            .children
            .entry(by)
            .or_default()
            .push(child as ElementHandle);
    }

    pub fn clicks(&self) -> u32 {
        self.state.lock().clicks
    }

    /// Text typed since the last clear.
    pub fn value(&self) -> String {
        self.state.lock().value.clone()
    }

    /// Function declarations passed to `call_function`, in order.
    pub fn functions(&self) -> Vec<String> {
        self.state.lock().functions.clone()
    }

    fn ensure_attached(&self, state: &ElementState) -> Result<()> {
        if state.attached {
            Ok(())
        } else {
            Err(BrowserError::StaleElement(self.name.clone()))
        }
    }
}

impl fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeElement").field("name", &self.name).finish()
    }
}

#[async_trait]
impl WebElement for FakeElement {
    async fn text(&self) -> Result<String> {
        let state = self.state.lock();
        self.ensure_attached(&state)?;
        Ok(state.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        self.ensure_attached(&state)?;
        Ok(state.attributes.get(name).cloned())
    }

    async fn click(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_attached(&state)?;
        if state.failing_clicks > 0 {
            state.failing_clicks -= 1;
            return Err(BrowserError::ElementNotInteractable(self.name.clone()));
        }
        if !state.enabled || !state.displayed {
            return Err(BrowserError::ElementNotInteractable(self.name.clone()));
        }
        state.clicks += 1;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_attached(&state)?;
        state.value.push_str(text);
        Ok(())
    }

    async fn call_function(&self, function: &str) -> Result<Value> {
        let mut state = self.state.lock();
        self.ensure_attached(&state)?;
        state.functions.push(function.to_string());
        Ok(Value::Null)
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>> {
        let state = self.state.lock();
        self.ensure_attached(&state)?;
        Ok(state.children.get(by).cloned().unwrap_or_default())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_attached(&state)?;
        state.value.clear();
        Ok(())
    }

    async fn is_displayed(&self) -> Result<bool> {
        let state = self.state.lock();
        self.ensure_attached(&state)?;
        Ok(state.displayed)
    }

    async fn is_enabled(&self) -> Result<bool> {
        let state = self.state.lock();
        self.ensure_attached(&state)?;
        Ok(state.enabled)
    }

    async fn is_attached(&self) -> Result<bool> {
        Ok(self.state.lock().attached)
    }
}

#[derive(Debug)]
struct DriverState {
    url: String,
    title: String,
    page_source: String,
    elements: HashMap<By, Vec<ElementHandle>>,
    scripts: HashMap<String, Value>,
    ready_state: String,
    window_size: (u32, u32),
    version: String,
    implicit_wait: Duration,
    failing: HashSet<FakeCall>,
    calls: Vec<FakeCall>,
    navigations: Vec<String>,
    quit: bool,
    disposed: bool,
}

/// Scriptable driver.
pub struct FakeDriver {
    browser: BrowserType,
    state: Mutex<DriverState>,
}

impl FakeDriver {
    pub fn new(browser: BrowserType) -> Self {
        Self {
            browser,
            state: Mutex::new(DriverState {
                url: "about:blank".to_string(),
                title: String::new(),
                page_source: "<html><head></head><body></body></html>".to_string(),
                elements: HashMap::new(),
                scripts: HashMap::new(),
                ready_state: "complete".to_string(),
                window_size: (1920, 1080),
                version: "HeadlessChrome/120.0.6099.71".to_string(),
                implicit_wait: Duration::ZERO,
                failing: HashSet::new(),
                calls: Vec::new(),
                navigations: Vec::new(),
                quit: false,
                disposed: false,
            }),
        }
    }

    #[must_use]
    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.state.lock().version = version.into();
        self
    }

    #[must_use]
    pub fn with_window_size(self, width: u32, height: u32) -> Self {
        self.state.lock().window_size = (width, height);
        self
    }

    #[must_use]
    pub fn failing(self, call: FakeCall) -> Self {
        self.fail(call);
        self
    }

    pub fn fail(&self, call: FakeCall) {
        self.state.lock().failing.insert(call);
    }

    pub fn recover(&self, call: FakeCall) {
        self.state.lock().failing.remove(&call);
    }

    pub fn add_element(&self, by: By, element: Arc<FakeElement>) {
        self.state
            .lock()
            .elements
            .entry(by)
            .or_default()
            .push(element as ElementHandle);
    }

    pub fn set_elements(&self, by: By, elements: Vec<Arc<FakeElement>>) {
        let handles = elements.into_iter().map(|e| e as ElementHandle).collect();
        self.state.lock().elements.insert(by, handles);
    }

    pub fn remove_elements(&self, by: &By) {
        self.state.lock().elements.remove(by);
    }

    pub fn set_script_result(&self, script: impl Into<String>, value: Value) {
        self.state.lock().scripts.insert(script.into(), value);
    }

    pub fn set_ready_state(&self, state: impl Into<String>) {
        self.state.lock().ready_state = state.into();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.state.lock().title = title.into();
    }

    pub fn set_page_source(&self, source: impl Into<String>) {
        self.state.lock().page_source = source.into();
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, call: FakeCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn is_quit(&self) -> bool {
        self.state.lock().quit
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// True once the session ended through either quit or dispose.
    pub fn is_terminated(&self) -> bool {
        let state = self.state.lock();
        state.quit || state.disposed
    }

    fn record(&self, call: FakeCall) -> Result<parking_lot::MutexGuard<'_, DriverState>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failing.contains(&call) {
            return Err(injected(call));
        }
        Ok(state)
    }
}

impl fmt::Debug for FakeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeDriver")
            .field("browser", &self.browser)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WebDriver for FakeDriver {
    fn browser(&self) -> BrowserType {
        self.browser
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.record(FakeCall::Navigate)?;
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.record(FakeCall::PageSource)?.page_source.clone())
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>> {
        Ok(self
            .state
            .lock()
            .elements
            .get(by)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        let state = self.record(FakeCall::ExecuteScript)?;
        if let Some(value) = state.scripts.get(script) {
            return Ok(value.clone());
        }
        if script.trim() == "document.readyState" {
            return Ok(Value::String(state.ready_state.clone()));
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record(FakeCall::Screenshot)?;
        Ok(FAKE_PNG.to_vec())
    }

    async fn window_size(&self) -> Result<(u32, u32)> {
        Ok(self.state.lock().window_size)
    }

    async fn browser_version(&self) -> Result<String> {
        Ok(self.record(FakeCall::BrowserVersion)?.version.clone())
    }

    fn implicit_wait(&self) -> Duration {
        self.state.lock().implicit_wait
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<()> {
        self.record(FakeCall::SetImplicitWait)?.implicit_wait = timeout;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(FakeCall::Close)?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.record(FakeCall::Quit)?.quit = true;
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.record(FakeCall::Dispose)?.disposed = true;
        Ok(())
    }
}

type DriverSetup = Arc<dyn Fn(&FakeDriver) + Send + Sync>;

/// Factory producing a fresh [`FakeDriver`] per `create`.
#[derive(Default)]
pub struct FakeFactory {
    version: Option<String>,
    launch_error: Option<String>,
    driver_failures: Vec<FakeCall>,
    setup: Option<DriverSetup>,
    created: Mutex<Vec<Arc<FakeDriver>>>,
    options: Mutex<Vec<BrowserOptions>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version string reported by created drivers.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Every `create` fails with `LaunchFailed`.
    #[must_use]
    pub fn failing_launch(mut self, reason: impl Into<String>) -> Self {
        self.launch_error = Some(reason.into());
        self
    }

    /// Created drivers fail on `call`.
    #[must_use]
    pub fn with_driver_failure(mut self, call: FakeCall) -> Self {
        self.driver_failures.push(call);
        self
    }

    /// Runs `setup` on every created driver, e.g. to seed elements.
    #[must_use]
    pub fn on_create<F>(mut self, setup: F) -> Self
    where
        F: Fn(&FakeDriver) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn created(&self) -> Vec<Arc<FakeDriver>> {
        self.created.lock().clone()
    }

    pub fn last_driver(&self) -> Option<Arc<FakeDriver>> {
        self.created.lock().last().cloned()
    }

    /// Options passed to `create`, in order.
    pub fn options(&self) -> Vec<BrowserOptions> {
        self.options.lock().clone()
    }
}

#[async_trait]
impl BrowserFactory for FakeFactory {
    async fn create(&self, options: &BrowserOptions) -> Result<crate::DriverHandle> {
        self.options.lock().push(options.clone());

        if let Some(reason) = &self.launch_error {
            return Err(BrowserError::LaunchFailed {
                browser: options.browser,
                reason: reason.clone(),
                source: None,
            });
        }

        let mut driver = FakeDriver::new(options.browser)
            .with_window_size(options.window_size.0, options.window_size.1);
        if let Some(version) = &self.version {
            driver = driver.with_version(version.clone());
        }
        for call in &self.driver_failures {
            driver.fail(*call);
        }
        if let Some(setup) = &self.setup {
            setup(&driver);
        }

        let driver = Arc::new(driver);
        self.created.lock().push(driver.clone());
        Ok(driver)
    }
}

/// One reporter call captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    StepStarted {
        name: String,
        parent: Option<StepId>,
    },
    StepFinished {
        step: StepId,
        status: Status,
        message: Option<String>,
    },
    Attachment {
        step: Option<StepId>,
        name: String,
        content_type: String,
        size: usize,
    },
    Finished(TestOutcome),
}

pub struct RecordingReporter {
    info: TestInfo,
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn info(&self) -> &TestInfo {
        &self.info
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    pub fn outcome(&self) -> Option<TestOutcome> {
        self.events.lock().iter().find_map(|event| match event {
            ReportEvent::Finished(outcome) => Some(outcome.clone()),
            _ => None,
        })
    }

    pub fn attachment_names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Attachment { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn step_started(&self, name: &str, parent: Option<StepId>) -> StepId {
        let mut events = self.events.lock();
        let id = StepId(
            events
                .iter()
                .filter(|event| matches!(event, ReportEvent::StepStarted { .. }))
                .count(),
        );
        events.push(ReportEvent::StepStarted {
            name: name.to_string(),
            parent,
        });
        id
    }

    fn step_finished(&self, step: StepId, status: Status, message: Option<&str>) {
        self.events.lock().push(ReportEvent::StepFinished {
            step,
            status,
            message: message.map(str::to_string),
        });
    }

    fn attach(
        &self,
        step: Option<StepId>,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<()> {
        self.events.lock().push(ReportEvent::Attachment {
            step,
            name: name.to_string(),
            content_type: content_type.to_string(),
            size: data.len(),
        });
        Ok(())
    }

    fn finish(&self, outcome: &TestOutcome) -> Result<()> {
        self.events
            .lock()
            .push(ReportEvent::Finished(outcome.clone()));
        Ok(())
    }
}

/// Sink that keeps every reporter it opens.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Arc<RecordingReporter>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Arc<RecordingReporter>> {
        self.reports.lock().clone()
    }

    pub fn report_for(&self, test_name: &str) -> Option<Arc<RecordingReporter>> {
        self.reports
            .lock()
            .iter()
            .find(|r| r.info.name == test_name)
            .cloned()
    }
}

impl ReportSink for RecordingSink {
    fn open(&self, test: &TestInfo) -> Result<Arc<dyn Reporter>> {
        let reporter = Arc::new(RecordingReporter {
            info: test.clone(),
            events: Mutex::new(Vec::new()),
        });
        self.reports.lock().push(reporter.clone());
        Ok(reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_failures_are_recorded() {
        let driver = FakeDriver::new(BrowserType::Chrome).failing(FakeCall::Quit);

        assert!(driver.close().await.is_ok());
        assert!(driver.quit().await.is_err());
        assert!(!driver.is_quit());
        assert_eq!(driver.calls(), vec![FakeCall::Close, FakeCall::Quit]);
    }

    #[tokio::test]
    async fn detached_element_is_stale() {
        let element = FakeElement::with_text("row", "first");
        element.detach();

        assert!(matches!(
            element.text().await,
            Err(BrowserError::StaleElement(_))
        ));
        assert!(!element.is_attached().await.unwrap());
    }

    #[tokio::test]
    async fn ready_state_answers_document_script() {
        let driver = FakeDriver::new(BrowserType::Edge);
        driver.set_ready_state("loading");
        assert_eq!(
            driver.execute_script("document.readyState").await.unwrap(),
            Value::String("loading".into())
        );
    }
}
