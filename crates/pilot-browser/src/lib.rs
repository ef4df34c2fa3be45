//! # pilot-browser
//!
//! A page-object browser test framework built on chromiumoxide.
//!
//! Tests get a browser session per worker, explicit waits over composable
//! conditions, retries for flaky interactions, and Allure-compatible reports,
//! with teardown that never leaves a browser process behind.
//!
//! ## Architecture
//!
//! - **WebDriver / WebElement**: browser-agnostic driver traits
//! - **ChromiumDriver**: the chromiumoxide backend (local launch or remote CDP)
//! - **BrowserFactoryRegistry**: browser family → factory, with version checks
//! - **DriverStore**: one driver context per worker
//! - **DriverInitializer / DriverLifecycle / TestDriverManager**: create,
//!   configure and terminate drivers
//! - **RetryPolicy**: exponential backoff over an error allow-list
//! - **Wait / Condition**: explicit waits and `AllOf` / `AnyOf` composition
//! - **FrameworkContext / TestScope / TestSession**: the per-test lifecycle
//! - **ReportSink / Reporter**: steps, attachments and outcomes
//!
//! ## Example Usage
//!
//! ```ignore
//! use pilot_browser::{By, FrameworkContext};
//! use pilot_config::BrowserType;
//!
//! #[tokio::test]
//! #[ignore] // Requires Chrome to be installed
//! async fn login_page_renders() -> anyhow::Result<()> {
//!     let ctx = FrameworkContext::load(env!("CARGO_MANIFEST_DIR"))?;
//!
//!     ctx.run_test("login page renders", BrowserType::Chrome, |session| async move {
//!         session
//!             .step("open login", session.driver().navigate(&session.url("/login")))
//!             .await?;
//!         let heading = session.actions().text_of(&By::css("h1")).await?;
//!         anyhow::ensure!(heading == "Sign in");
//!         Ok(())
//!     })
//!     .await
//!     .into_result()
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! 1. **Unit and integration tests** run against the in-memory doubles in
//!    [`testing`]
//! 2. **Real browser tests** require Chrome and are `#[ignore]`d
//!
//! Run with `cargo test` or `cargo test -- --ignored`.

#![warn(clippy::all)]

pub mod chromium;
pub mod conditions;
pub mod driver;
pub mod error;
pub mod factory;
pub mod harness;
pub mod init;
pub mod lifecycle;
pub mod logger;
pub mod manager;
pub mod options;
pub mod page;
pub mod report;
pub mod retry;
pub mod store;
pub mod testing;
pub mod wait;

// Re-export main types for convenience
pub use chromium::{ChromiumDriver, ChromiumElement};
pub use conditions::{AllOf, AnyOf, Condition, Probe};
pub use driver::{By, DriverHandle, ElementHandle, WebDriver, WebElement};
pub use error::{BrowserError, Result};
pub use factory::{BrowserFactory, BrowserFactoryRegistry, ChromiumFactory, MIN_SUPPORTED_VERSION};
pub use harness::{FrameworkContext, FrameworkContextBuilder, Hooks, ScopeState, TestScope, TestSession};
pub use init::DriverInitializer;
pub use lifecycle::DriverLifecycle;
pub use manager::TestDriverManager;
pub use options::BrowserOptions;
pub use page::{Actions, PageObject};
pub use report::{
    AllureSink, DisabledSink, ReportSink, Reporter, Status, StepId, TestInfo, TestOutcome,
};
pub use retry::RetryPolicy;
pub use store::{DriverContext, DriverStore, WorkerId};
pub use wait::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Wait, WaitConfig};
