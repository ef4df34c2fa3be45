//! Test lifecycle.
//!
//! [`FrameworkContext`] is the explicitly constructed application context for
//! a test run: it owns the settings, the factory registry, the driver store,
//! the report sink and the registered hooks, and is shut down explicitly.
//!
//! Each test goes through a [`TestScope`]:
//!
//! ```text
//! Uninitialized --initialize--> Ready --finalize--> Finalized
//!       \_____________________finalize______________/
//! ```
//!
//! `initialize` opens the report, starts the driver and yields a
//! [`TestSession`]. `finalize` captures failure evidence, finishes the report
//! and always quits the driver. Both calls must run on the same worker, which
//! [`FrameworkContext::run_test`] guarantees.
//!
//! ```ignore
//! let ctx = FrameworkContext::load(".")?;
//! let outcome = ctx
//!     .run_test("login shows dashboard", BrowserType::Chrome, |session| async move {
//!         session.driver().navigate(&session.url("/login")).await?;
//!         Ok(())
//!     })
//!     .await;
//! outcome.into_result()?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use pilot_config::{BrowserType, Settings, TARGET_BROWSER_ENV, browser_filter_allows};
use tracing::{Instrument, error, info, info_span, warn};

use crate::driver::DriverHandle;
use crate::error::{BrowserError, Result};
use crate::factory::BrowserFactoryRegistry;
use crate::init::DriverInitializer;
use crate::lifecycle::DriverLifecycle;
use crate::logger::init_logging;
use crate::manager::TestDriverManager;
use crate::page::{Actions, join_url};
use crate::report::{
    AllureSink, DisabledSink, ReportSink, Reporter, Status, StepId, TestInfo, TestOutcome,
};
use crate::retry::RetryPolicy;
use crate::store::{DriverStore, WorkerId};
use crate::wait::{Wait, WaitConfig};

type HookFn = Arc<dyn Fn(TestSession) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

tokio::task_local! {
    static CURRENT_STEP: StepId;
}

/// Runs one hook, reporting a panic as an error.
async fn call_hook(hook: &HookFn, session: &TestSession) -> anyhow::Result<()> {
    match AssertUnwindSafe(hook(session.clone())).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "hook panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

/// Ordered per-test setup and teardown callbacks.
#[derive(Clone, Default)]
pub struct Hooks {
    before_each: Vec<(String, HookFn)>,
    after_each: Vec<(String, HookFn)>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs after the driver starts and before the test body, in
    /// registration order. The first failure marks the test broken.
    #[must_use]
    pub fn before_each<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(TestSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_each.push((name.into(), boxed(hook)));
        self
    }

    /// Runs after the test body, in registration order. Every hook runs even
    /// when an earlier one fails.
    #[must_use]
    pub fn after_each<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(TestSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.after_each.push((name.into(), boxed(hook)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before_each.is_empty() && self.after_each.is_empty()
    }

    async fn run_before(&self, session: &TestSession) -> anyhow::Result<()> {
        for (name, hook) in &self.before_each {
            call_hook(hook, session)
                .await
                .map_err(|err| err.context(format!("before_each hook '{name}' failed")))?;
        }
        Ok(())
    }

    async fn run_after(&self, session: &TestSession) -> Option<anyhow::Error> {
        let mut first_failure = None;
        for (name, hook) in &self.after_each {
            if let Err(err) = call_hook(hook, session).await {
                let err = err.context(format!("after_each hook '{name}' failed"));
                warn!(test = %session.name(), error = %format!("{err:#}"), "teardown hook failed");
                first_failure.get_or_insert(err);
            }
        }
        first_failure
    }
}

fn boxed<F, Fut>(hook: F) -> HookFn
where
    F: Fn(TestSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |session| hook(session).boxed())
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |hooks: &[(String, HookFn)]| -> Vec<String> {
            hooks.iter().map(|(name, _)| name.clone()).collect()
        };
        f.debug_struct("Hooks")
            .field("before_each", &names(&self.before_each))
            .field("after_each", &names(&self.after_each))
            .finish()
    }
}

struct ContextInner {
    settings: Arc<Settings>,
    registry: Arc<BrowserFactoryRegistry>,
    initializer: DriverInitializer,
    store: Arc<DriverStore>,
    sink: Arc<dyn ReportSink>,
    hooks: Hooks,
    browser_filter: Option<String>,
    lifecycle: DriverLifecycle,
}

/// Application context for one test run.
#[derive(Clone)]
pub struct FrameworkContext {
    inner: Arc<ContextInner>,
}

pub struct FrameworkContextBuilder {
    settings: Settings,
    registry: Option<BrowserFactoryRegistry>,
    sink: Option<Arc<dyn ReportSink>>,
    hooks: Hooks,
    browser_filter: Option<Option<String>>,
}

impl FrameworkContextBuilder {
    /// Replaces the default chromium registry.
    #[must_use]
    pub fn registry(mut self, registry: BrowserFactoryRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the sink chosen from the reporting settings.
    #[must_use]
    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Overrides the `TARGET_BROWSER_CI` value read at build time.
    #[must_use]
    pub fn browser_filter(mut self, filter: Option<String>) -> Self {
        self.browser_filter = Some(filter);
        self
    }

    pub fn build(self) -> FrameworkContext {
        let settings = Arc::new(self.settings);
        let registry = Arc::new(self.registry.unwrap_or_default());

        let sink: Arc<dyn ReportSink> = match self.sink {
            Some(sink) => sink,
            None if settings.reporting.enabled => {
                Arc::new(AllureSink::new(settings.reporting.results_dir.clone()))
            }
            None => Arc::new(DisabledSink),
        };

        let browser_filter = self
            .browser_filter
            .unwrap_or_else(|| std::env::var(TARGET_BROWSER_ENV).ok());

        FrameworkContext {
            inner: Arc::new(ContextInner {
                initializer: DriverInitializer::new(registry.clone(), settings.clone()),
                settings,
                registry,
                store: Arc::new(DriverStore::new()),
                sink,
                hooks: self.hooks,
                browser_filter,
                lifecycle: DriverLifecycle,
            }),
        }
    }
}

impl FrameworkContext {
    pub fn builder(settings: Settings) -> FrameworkContextBuilder {
        FrameworkContextBuilder {
            settings,
            registry: None,
            sink: None,
            hooks: Hooks::default(),
            browser_filter: None,
        }
    }

    /// Loads settings from `root`, installs logging and builds the default
    /// context.
    ///
    /// # Errors
    ///
    /// Returns `Config` when settings fail to load or validate.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let settings = pilot_config::load_settings(root)?;
        init_logging(&settings.logging);
        Ok(Self::builder(settings).build())
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.inner.settings
    }

    pub fn store(&self) -> &Arc<DriverStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<BrowserFactoryRegistry> {
        &self.inner.registry
    }

    /// True when the CI browser filter admits `browser`.
    pub fn is_browser_enabled(&self, browser: BrowserType) -> bool {
        browser_filter_allows(self.inner.browser_filter.as_deref(), browser)
    }

    /// Browsers with settings that the filter admits, in settings order.
    pub fn enabled_browsers(&self) -> Vec<BrowserType> {
        self.inner
            .settings
            .browsers
            .keys()
            .copied()
            .filter(|browser| self.is_browser_enabled(*browser))
            .collect()
    }

    /// A fresh scope with a new correlation id.
    pub fn scope(&self, test_name: impl Into<String>, browser: BrowserType) -> TestScope {
        TestScope::new(self.inner.clone(), test_name.into(), browser, new_correlation_id())
    }

    /// Runs `body` as one test on its own worker and returns the outcome.
    ///
    /// Filtered browsers yield `Skipped`. Setup and `before_each` failures
    /// yield `Broken`; body errors and panics yield `Failed`. Teardown always
    /// runs.
    pub async fn run_test<F, Fut>(&self, test_name: &str, browser: BrowserType, body: F) -> TestOutcome
    where
        F: FnOnce(TestSession) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let correlation_id = new_correlation_id();
        let span = info_span!("test", test = %test_name, %browser, correlation_id = %correlation_id);

        let scope = TestScope::new(self.inner.clone(), test_name.to_string(), browser, correlation_id);
        WorkerId::next()
            .scope(self.execute(scope, body))
            .instrument(span)
            .await
    }

    /// Runs `body` on the configured default browser.
    pub async fn run<F, Fut>(&self, test_name: &str, body: F) -> TestOutcome
    where
        F: FnOnce(TestSession) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let browser = self.inner.settings.framework.default_browser;
        self.run_test(test_name, browser, body).await
    }

    /// Runs `body` once per enabled browser, sequentially.
    pub async fn run_across_browsers<F, Fut>(
        &self,
        test_name: &str,
        body: F,
    ) -> Vec<(BrowserType, TestOutcome)>
    where
        F: Fn(TestSession) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut outcomes = Vec::new();
        for browser in self.enabled_browsers() {
            let name = format!("{test_name} [{browser}]");
            let outcome = self.run_test(&name, browser, &body).await;
            outcomes.push((browser, outcome));
        }
        outcomes
    }

    async fn execute<F, Fut>(&self, mut scope: TestScope, body: F) -> TestOutcome
    where
        F: FnOnce(TestSession) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let started = Instant::now();

        if !self.is_browser_enabled(scope.browser) {
            let outcome = TestOutcome::Skipped {
                reason: format!("{} excluded by {TARGET_BROWSER_ENV}", scope.browser),
            };
            if let Err(err) = scope.finalize(&outcome).await {
                warn!(error = %err, "failed to record skipped test");
            }
            info!("test skipped");
            return outcome;
        }

        let mut outcome = match scope.initialize().await {
            Err(err) => TestOutcome::Broken {
                message: format!("setup failed: {err}"),
            },
            Ok(session) => self.run_body(&session, body).await,
        };

        if let Some(session) = scope.session.clone() {
            if let Some(err) = self.inner.hooks.run_after(&session).await {
                if outcome.is_passed() {
                    outcome = TestOutcome::Broken {
                        message: format!("{err:#}"),
                    };
                }
            }
        }

        if let Err(err) = scope.finalize(&outcome).await {
            error!(error = %err, "test scope finalization failed");
        }

        info!(outcome = %outcome, elapsed = ?started.elapsed(), "test finished");
        outcome
    }

    async fn run_body<F, Fut>(&self, session: &TestSession, body: F) -> TestOutcome
    where
        F: FnOnce(TestSession) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if let Err(err) = self.inner.hooks.run_before(session).await {
            return TestOutcome::Broken {
                message: format!("{err:#}"),
            };
        }

        let session = session.clone();
        let result = AssertUnwindSafe(async move { body(session).await })
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => TestOutcome::Passed,
            Ok(Err(err)) => TestOutcome::Failed {
                message: format!("{err:#}"),
            },
            Err(panic) => TestOutcome::Failed {
                message: format!("test panicked: {}", panic_message(panic.as_ref())),
            },
        }
    }

    /// Quits every driver still registered, from any worker. Returns how many
    /// were left behind.
    pub async fn shutdown(&self) -> usize {
        let leaked = self.inner.store.drain();
        for context in &leaked {
            warn!(test = %context.test_name, correlation_id = %context.correlation_id, "driver leaked past its test");
            self.inner
                .lifecycle
                .quit(&context.driver, &context.test_name, &context.correlation_id)
                .await;
        }
        info!(leaked = leaked.len(), "framework context shut down");
        leaked.len()
    }
}

impl fmt::Debug for FrameworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkContext")
            .field("settings", &self.inner.settings)
            .field("hooks", &self.inner.hooks)
            .field("browser_filter", &self.inner.browser_filter)
            .finish_non_exhaustive()
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Uninitialized,
    Ready,
    Finalized,
}

impl ScopeState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeState::Uninitialized => "uninitialized",
            ScopeState::Ready => "ready",
            ScopeState::Finalized => "finalized",
        }
    }
}

/// Per-test lifecycle state machine. Not reusable.
pub struct TestScope {
    ctx: Arc<ContextInner>,
    test_name: String,
    browser: BrowserType,
    correlation_id: String,
    manager: TestDriverManager,
    reporter: Option<Arc<dyn Reporter>>,
    session: Option<TestSession>,
    state: ScopeState,
}

impl TestScope {
    fn new(ctx: Arc<ContextInner>, test_name: String, browser: BrowserType, correlation_id: String) -> Self {
        let manager = TestDriverManager::new(
            ctx.store.clone(),
            ctx.initializer.clone(),
            test_name.clone(),
            correlation_id.clone(),
        );
        Self {
            ctx,
            test_name,
            browser,
            correlation_id,
            manager,
            reporter: None,
            session: None,
            state: ScopeState::Uninitialized,
        }
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn session(&self) -> Option<&TestSession> {
        self.session.as_ref()
    }

    fn reporter(&mut self) -> Result<Arc<dyn Reporter>> {
        if let Some(reporter) = &self.reporter {
            return Ok(reporter.clone());
        }
        let info = TestInfo::new(&self.test_name, self.browser, &self.correlation_id)
            .with_label("worker", format!("{:?}", WorkerId::current()));
        let reporter = self.ctx.sink.open(&info)?;
        self.reporter = Some(reporter.clone());
        Ok(reporter)
    }

    /// Opens the report and starts the driver.
    ///
    /// # Errors
    ///
    /// `InvalidScopeState` unless uninitialized; otherwise report or driver
    /// errors. The scope stays uninitialized on failure and can still be
    /// finalized.
    pub async fn initialize(&mut self) -> Result<TestSession> {
        if self.state != ScopeState::Uninitialized {
            return Err(BrowserError::InvalidScopeState {
                expected: ScopeState::Uninitialized.as_str(),
                actual: self.state.as_str(),
            });
        }

        let reporter = self.reporter()?;
        let driver = self.manager.initialize(self.browser).await?;

        let session = TestSession {
            inner: Arc::new(SessionInner {
                test_name: self.test_name.clone(),
                browser: self.browser,
                correlation_id: self.correlation_id.clone(),
                driver,
                settings: self.ctx.settings.clone(),
                reporter,
            }),
        };
        self.session = Some(session.clone());
        self.state = ScopeState::Ready;
        info!(test = %self.test_name, correlation_id = %self.correlation_id, "test scope ready");
        Ok(session)
    }

    /// Records `outcome` and releases the driver.
    ///
    /// # Errors
    ///
    /// `InvalidScopeState` when already finalized, or the report error after
    /// the driver has been released.
    pub async fn finalize(&mut self, outcome: &TestOutcome) -> Result<()> {
        if self.state == ScopeState::Finalized {
            return Err(BrowserError::InvalidScopeState {
                expected: ScopeState::Ready.as_str(),
                actual: self.state.as_str(),
            });
        }

        let reported = self.report_outcome(outcome).await;

        self.manager.quit().await;
        self.session = None;
        self.state = ScopeState::Finalized;
        reported
    }

    async fn report_outcome(&mut self, outcome: &TestOutcome) -> Result<()> {
        if outcome.is_failure() && self.ctx.settings.framework.screenshot_on_failure {
            if let Some(session) = &self.session {
                if let Err(err) = session.attach_failure_evidence().await {
                    warn!(test = %self.test_name, error = %err, "could not capture failure evidence");
                }
            }
        }

        let reporter = match self.reporter() {
            Ok(reporter) => reporter,
            Err(err) => {
                error!(
                    test = %self.test_name,
                    correlation_id = %self.correlation_id,
                    outcome = %outcome,
                    error = %err,
                    "report unavailable, outcome not recorded"
                );
                return Err(err);
            }
        };
        reporter.finish(outcome)
    }
}

impl fmt::Debug for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScope")
            .field("test_name", &self.test_name)
            .field("browser", &self.browser)
            .field("correlation_id", &self.correlation_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

struct SessionInner {
    test_name: String,
    browser: BrowserType,
    correlation_id: String,
    driver: DriverHandle,
    settings: Arc<Settings>,
    reporter: Arc<dyn Reporter>,
}

/// Everything a running test needs. Cheap to clone.
#[derive(Clone)]
pub struct TestSession {
    inner: Arc<SessionInner>,
}

impl TestSession {
    pub fn name(&self) -> &str {
        &self.inner.test_name
    }

    pub fn browser(&self) -> BrowserType {
        self.inner.browser
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.inner.driver
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Explicit wait configured from the framework settings.
    pub fn wait(&self) -> Wait {
        Wait::new(
            self.inner.driver.clone(),
            WaitConfig::from_settings(&self.inner.settings.framework),
        )
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_settings(&self.inner.settings.retry)
    }

    pub fn actions(&self) -> Actions {
        Actions::new(
            self.wait(),
            self.retry(),
            self.inner.settings.framework.highlight_duration(),
        )
    }

    /// `path` joined onto the configured base URL.
    pub fn url(&self, path: &str) -> String {
        join_url(self.inner.settings.framework.base_url.as_deref(), path)
    }

    /// Runs `work` as a named report step.
    ///
    /// Steps started inside `work` nest under this one. Steps started
    /// concurrently from clones of the session are siblings.
    ///
    /// # Errors
    ///
    /// Returns the error from `work` unchanged.
    pub async fn step<T, E, Fut>(&self, name: &str, work: Fut) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let parent = CURRENT_STEP.try_with(|step| *step).ok();
        let step = self.inner.reporter.step_started(name, parent);
        let result = CURRENT_STEP.scope(step, work).await;
        match &result {
            Ok(_) => self.inner.reporter.step_finished(step, Status::Passed, None),
            Err(err) => {
                let message = err.to_string();
                self.inner
                    .reporter
                    .step_finished(step, Status::Failed, Some(&message));
            }
        }
        result
    }

    /// Attaches to the enclosing step, or to the test outside any step.
    ///
    /// # Errors
    ///
    /// Returns the reporter's write error.
    pub fn attach(&self, name: &str, content_type: &str, data: &[u8]) -> Result<()> {
        let step = CURRENT_STEP.try_with(|step| *step).ok();
        self.inner.reporter.attach(step, name, content_type, data)
    }

    /// # Errors
    ///
    /// Returns screenshot or report errors.
    pub async fn attach_screenshot(&self, name: &str) -> Result<()> {
        let png = self.inner.driver.screenshot().await?;
        self.attach(name, "image/png", &png)
    }

    async fn attach_failure_evidence(&self) -> Result<()> {
        self.attach_screenshot("failure screenshot").await?;
        let source = self.inner.driver.page_source().await?;
        self.attach("page source", "text/html", source.as_bytes())
    }
}

impl fmt::Debug for TestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSession")
            .field("test_name", &self.inner.test_name)
            .field("browser", &self.inner.browser)
            .field("correlation_id", &self.inner.correlation_id)
            .finish_non_exhaustive()
    }
}
