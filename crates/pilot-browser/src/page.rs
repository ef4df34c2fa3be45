//! Page-object support.
//!
//! A page object names a path under the base URL and a locator that proves
//! the page rendered. Interactions go through [`Actions`], which waits for the
//! target element and retries transient failures.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use crate::conditions::{AllOf, Condition, document_ready, element_clickable, element_visible};
use crate::driver::{By, DriverHandle, ElementHandle};
use crate::error::{BrowserError, Result};
use crate::harness::TestSession;
use crate::retry::RetryPolicy;
use crate::wait::Wait;

const HIGHLIGHT_ON: &str = "function() { this.style.outline = '3px solid #e8413c'; }";
const HIGHLIGHT_OFF: &str = "function() { this.style.outline = ''; }";

/// Joins `path` onto `base`.
///
/// Absolute URLs are returned unchanged, and so is every path when there is
/// no base.
///
/// ```ignore
/// join_url(Some("http://localhost:3000/"), "/app") // "http://localhost:3000/app"
/// ```
pub fn join_url(base: Option<&str>, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    match base {
        Some(base) => {
            let base = base.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
        None => path.to_string(),
    }
}

#[async_trait]
pub trait PageObject: Send + Sync {
    fn session(&self) -> &TestSession;

    /// Path relative to the configured base URL.
    fn path(&self) -> &str;

    /// Element that is visible once the page is usable.
    fn ready_locator(&self) -> By;

    /// Navigates to the page and waits until it is loaded.
    async fn open(&self) -> Result<()> {
        let url = self.session().url(self.path());
        debug!(%url, "opening page");
        self.session().driver().navigate(&url).await?;
        self.wait_until_loaded().await
    }

    async fn wait_until_loaded(&self) -> Result<()> {
        let loaded = AllOf::new()
            .with(document_ready())
            .with(element_visible(self.ready_locator()));
        self.session().wait().until(&loaded).await.map(|_| ())
    }

    /// Single probe, no waiting.
    async fn is_loaded(&self) -> Result<bool> {
        let driver = self.session().driver();
        match element_visible(self.ready_locator()).check(driver.as_ref()).await {
            Ok(found) => Ok(found.is_some()),
            Err(BrowserError::StaleElement(_) | BrowserError::ElementNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Wait-then-act helpers shared by page objects.
#[derive(Debug, Clone)]
pub struct Actions {
    wait: Wait,
    retry: RetryPolicy,
    highlight: Duration,
}

impl Actions {
    pub fn new(wait: Wait, retry: RetryPolicy, highlight: Duration) -> Self {
        Self {
            wait,
            retry,
            highlight,
        }
    }

    pub fn driver(&self) -> &DriverHandle {
        self.wait.driver()
    }

    /// # Errors
    ///
    /// `WaitTimeout` when the element never becomes clickable, or the last
    /// click error once retries are exhausted.
    pub async fn click(&self, by: &By) -> Result<()> {
        self.retry
            .execute(&format!("click {by}"), || self.click_once(by))
            .await
    }

    async fn click_once(&self, by: &By) -> Result<()> {
        let element = self.wait.until(&element_clickable(by.clone())).await?;
        self.highlight(&element).await;
        element.click().await
    }

    /// Replaces the content of an input.
    ///
    /// # Errors
    ///
    /// See [`Actions::click`].
    pub async fn type_text(&self, by: &By, text: &str) -> Result<()> {
        self.retry
            .execute(&format!("type into {by}"), || self.type_once(by, text))
            .await
    }

    async fn type_once(&self, by: &By, text: &str) -> Result<()> {
        let element = self.wait.until(&element_visible(by.clone())).await?;
        self.highlight(&element).await;
        element.clear().await?;
        element.send_keys(text).await
    }

    /// # Errors
    ///
    /// See [`Actions::click`].
    pub async fn text_of(&self, by: &By) -> Result<String> {
        self.retry
            .execute_value(&format!("read text of {by}"), || self.text_once(by))
            .await
    }

    async fn text_once(&self, by: &By) -> Result<String> {
        let element = self.wait.until(&element_visible(by.clone())).await?;
        element.text().await
    }

    pub async fn is_visible(&self, by: &By) -> Result<bool> {
        Ok(element_visible(by.clone())
            .check(self.driver().as_ref())
            .await?
            .is_some())
    }

    /// Outlines `element` for the configured duration. Cosmetic; failures
    /// are ignored.
    pub async fn highlight(&self, element: &ElementHandle) {
        if self.highlight.is_zero() {
            return;
        }
        if let Err(err) = element.call_function(HIGHLIGHT_ON).await {
            debug!(error = %err, "highlight skipped");
            return;
        }
        sleep(self.highlight).await;
        let _ = element.call_function(HIGHLIGHT_OFF).await;
    }
}
