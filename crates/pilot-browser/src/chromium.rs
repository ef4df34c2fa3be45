//! Chromium-family backend over the DevTools protocol.
//!
//! `ChromiumDriver` owns one chromiumoxide `Browser` and its first page. The
//! CDP handler runs on a spawned task for as long as the driver lives.
//!
//! # Termination
//!
//! - `close` closes the page (the window the test drove)
//! - `quit` asks the browser to exit and waits for the process
//! - `dispose` kills the process, stops the handler and removes the
//!   temporary profile; it is the fallback when `quit` failed

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use pilot_config::BrowserType;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::{By, ElementHandle, WebDriver, WebElement};
use crate::error::{BrowserError, Result};
use crate::options::BrowserOptions;

/// A browser session driven over CDP.
pub struct ChromiumDriver {
    browser_type: BrowserType,
    browser: Mutex<Option<Browser>>,
    page: Page,
    implicit_wait_ms: AtomicU64,
    handler: JoinHandle<()>,
    profile_dir: Option<PathBuf>,
}

impl ChromiumDriver {
    /// Launches a local browser process.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if the binary is missing, not executable,
    /// or fails to start.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        debug!(browser = %options.browser, args = ?options.args, "launching browser");

        options.write_preferences()?;
        let config = options.to_browser_config()?;

        let (browser, handler) =
            Browser::launch(config)
                .await
                .map_err(|e| BrowserError::LaunchFailed {
                    browser: options.browser,
                    reason: "failed to launch browser process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        Self::attach(
            options.browser,
            browser,
            handler,
            Some(options.user_data_dir.clone()),
        )
        .await
    }

    /// Connects to a remote DevTools endpoint (grid).
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the endpoint cannot be reached.
    pub async fn connect(browser_type: BrowserType, url: &str) -> Result<Self> {
        debug!(browser = %browser_type, url, "connecting to remote browser");

        let (browser, handler) = Browser::connect(url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed(format!("{url}: {e}")))?;

        Self::attach(browser_type, browser, handler, None).await
    }

    async fn attach(
        browser_type: BrowserType,
        browser: Browser,
        mut handler: chromiumoxide::handler::Handler,
        profile_dir: Option<PathBuf>,
    ) -> Result<Self> {
        // chromiumoxide only processes CDP events while the handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(BrowserError::ConnectionFailed(e.to_string()));
            }
        };

        Ok(Self {
            browser_type,
            browser: Mutex::new(Some(browser)),
            page,
            implicit_wait_ms: AtomicU64::new(0),
            handler,
            profile_dir,
        })
    }

    async fn evaluate_value(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    fn wrap(elements: Vec<Element>) -> Vec<ElementHandle> {
        elements
            .into_iter()
            .map(|element| Arc::new(ChromiumElement { inner: element }) as ElementHandle)
            .collect()
    }
}

impl fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("browser", &self.browser_type)
            .field("profile_dir", &self.profile_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WebDriver for ChromiumDriver {
    fn browser(&self) -> BrowserType {
        self.browser_type
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(BrowserError::from_cdp)?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> Result<String> {
        let title = self.page.get_title().await.map_err(BrowserError::from_cdp)?;
        Ok(title.unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        self.page.content().await.map_err(BrowserError::from_cdp)
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>> {
        let found = match by.to_css() {
            Some(selector) => self.page.find_elements(selector).await,
            None => {
                let By::XPath(expression) = by else {
                    return Err(BrowserError::UnsupportedLocator(by.to_string()));
                };
                self.page.find_xpaths(expression.as_str()).await
            }
        };

        match found {
            Ok(elements) => Ok(Self::wrap(elements)),
            // DevTools reports an empty match as a lookup error
            Err(e) if e.to_string().to_ascii_lowercase().contains("could not find node") => {
                Ok(Vec::new())
            }
            Err(e) => Err(BrowserError::from_cdp(e)),
        }
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        self.evaluate_value(script).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::default())
            .await
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))
    }

    async fn window_size(&self) -> Result<(u32, u32)> {
        let size: Vec<u32> =
            serde_json::from_value(self.evaluate_value("[window.outerWidth, window.outerHeight]").await?)?;
        match size.as_slice() {
            [width, height] => Ok((*width, *height)),
            _ => Err(BrowserError::ScriptExecutionFailed(
                "window size probe returned an unexpected shape".to_string(),
            )),
        }
    }

    async fn browser_version(&self) -> Result<String> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::AlreadyClosed)?;
        let version = browser.version().await.map_err(BrowserError::from_cdp)?;
        Ok(version.product)
    }

    fn implicit_wait(&self) -> Duration {
        Duration::from_millis(self.implicit_wait_ms.load(Ordering::Relaxed))
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<()> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.implicit_wait_ms.store(millis, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(BrowserError::ChromiumOxide)
    }

    async fn quit(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        let Some(browser) = guard.as_mut() else {
            return Ok(());
        };

        debug!(browser = %self.browser_type, "closing browser gracefully");
        browser
            .close()
            .await
            .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
        browser.wait().await?;

        guard.take();
        self.handler.abort();
        self.remove_profile();
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        self.handler.abort();

        if let Some(mut browser) = guard.take() {
            if let Some(result) = browser.kill().await {
                result?;
            }
        }

        self.remove_profile();
        Ok(())
    }
}

impl ChromiumDriver {
    fn remove_profile(&self) {
        if let Some(dir) = &self.profile_dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(dir = %dir.display(), error = %e, "could not remove profile directory");
                }
            }
        }
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        // chromiumoxide's Browser::drop kills a still-running child process;
        // the handler task would otherwise outlive the session.
        self.handler.abort();
    }
}

/// A DOM node resolved through CDP.
pub struct ChromiumElement {
    inner: Element,
}

impl fmt::Debug for ChromiumElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumElement")
            .field("node_id", &self.inner.node_id)
            .finish()
    }
}

#[async_trait]
impl WebElement for ChromiumElement {
    async fn text(&self) -> Result<String> {
        let text = self.inner.inner_text().await.map_err(BrowserError::from_cdp)?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.inner
            .attribute(name)
            .await
            .map_err(BrowserError::from_cdp)
    }

    async fn click(&self) -> Result<()> {
        self.inner.click().await.map_err(BrowserError::from_cdp)?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        self.inner
            .focus()
            .await
            .map_err(BrowserError::from_cdp)?
            .type_str(text)
            .await
            .map_err(BrowserError::from_cdp)?;
        Ok(())
    }

    async fn call_function(&self, function: &str) -> Result<Value> {
        let returns = self
            .inner
            .call_js_fn(function, false)
            .await
            .map_err(BrowserError::from_cdp)?;

        if let Some(details) = returns.exception_details {
            return Err(BrowserError::ScriptExecutionFailed(details.text));
        }
        Ok(returns.result.value.unwrap_or(Value::Null))
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>> {
        let selector = by
            .to_css()
            .ok_or_else(|| BrowserError::UnsupportedLocator(format!("{by} inside an element")))?;

        match self.inner.find_elements(selector).await {
            Ok(elements) => Ok(ChromiumDriver::wrap(elements)),
            Err(e) if e.to_string().to_ascii_lowercase().contains("could not find node") => {
                Ok(Vec::new())
            }
            Err(e) => Err(BrowserError::from_cdp(e)),
        }
    }
}
