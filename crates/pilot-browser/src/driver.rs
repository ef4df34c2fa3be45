//! Browser-agnostic driver and element abstractions.
//!
//! Everything above this module (store, waits, page objects, harness) talks to
//! a browser through [`WebDriver`] and [`WebElement`] trait objects. The
//! chromium backend lives in [`crate::chromium`]; in-memory doubles live in
//! [`crate::testing`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pilot_config::BrowserType;
use serde_json::Value;
use tokio::time::sleep;

use crate::error::{BrowserError, Result};
use crate::wait::DEFAULT_POLL_INTERVAL;

/// Shared handle to a running browser session.
pub type DriverHandle = Arc<dyn WebDriver>;

/// Shared handle to a located DOM element.
pub type ElementHandle = Arc<dyn WebElement>;

/// Element locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum By {
    Css(String),
    XPath(String),
    Id(String),
    ClassName(String),
    TagName(String),
}

impl By {
    pub fn css(selector: impl Into<String>) -> Self {
        By::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        By::XPath(expression.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        By::Id(id.into())
    }

    pub fn class_name(name: impl Into<String>) -> Self {
        By::ClassName(name.into())
    }

    pub fn tag_name(name: impl Into<String>) -> Self {
        By::TagName(name.into())
    }

    /// Returns the equivalent CSS selector, or `None` for XPath.
    pub fn to_css(&self) -> Option<String> {
        match self {
            By::Css(selector) => Some(selector.clone()),
            By::Id(id) => Some(format!("[id=\"{}\"]", escape_attribute(id))),
            By::ClassName(name) => Some(format!(".{}", escape_identifier(name))),
            By::TagName(name) => Some(name.clone()),
            By::XPath(_) => None,
        }
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            By::Css(s) => write!(f, "css '{s}'"),
            By::XPath(s) => write!(f, "xpath '{s}'"),
            By::Id(s) => write!(f, "id '{s}'"),
            By::ClassName(s) => write!(f, "class '{s}'"),
            By::TagName(s) => write!(f, "tag '{s}'"),
        }
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_identifier(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| {
            let escape = !(c.is_ascii_alphanumeric() || c == '-' || c == '_');
            escape.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}

/// A located DOM element.
///
/// The visibility and attachment probes are provided on top of
/// [`WebElement::call_function`]; backends that can answer them natively
/// override them.
#[async_trait]
pub trait WebElement: Send + Sync + fmt::Debug {
    async fn text(&self) -> Result<String>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn click(&self) -> Result<()>;

    async fn send_keys(&self, text: &str) -> Result<()>;

    /// Invokes a JavaScript function declaration with `this` bound to the element.
    async fn call_function(&self, function: &str) -> Result<Value>;

    /// Finds descendants of this element.
    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>>;

    async fn clear(&self) -> Result<()> {
        self.call_function(
            "function() { this.value = ''; \
             this.dispatchEvent(new Event('input', { bubbles: true })); }",
        )
        .await
        .map(|_| ())
    }

    async fn is_displayed(&self) -> Result<bool> {
        let visible = self
            .call_function(
                "function() { const r = this.getBoundingClientRect(); \
                 const s = window.getComputedStyle(this); \
                 return r.width > 0 && r.height > 0 && \
                 s.visibility !== 'hidden' && s.display !== 'none'; }",
            )
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool> {
        let enabled = self
            .call_function("function() { return !this.disabled; }")
            .await?;
        Ok(enabled.as_bool().unwrap_or(true))
    }

    /// Returns false (or `StaleElement`) once the node has left the document.
    async fn is_attached(&self) -> Result<bool> {
        let connected = self
            .call_function("function() { return this.isConnected; }")
            .await?;
        Ok(connected.as_bool().unwrap_or(false))
    }
}

/// One browser session.
#[async_trait]
pub trait WebDriver: Send + Sync + fmt::Debug {
    fn browser(&self) -> BrowserType;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn page_source(&self) -> Result<String>;

    /// Returns every current match without waiting.
    async fn find_elements(&self, by: &By) -> Result<Vec<ElementHandle>>;

    async fn execute_script(&self, script: &str) -> Result<Value>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Outer window size in CSS pixels.
    async fn window_size(&self) -> Result<(u32, u32)>;

    /// Product string reported by the browser, e.g. `HeadlessChrome/120.0.6099.71`.
    async fn browser_version(&self) -> Result<String>;

    fn implicit_wait(&self) -> Duration;

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<()>;

    /// Closes the current window.
    async fn close(&self) -> Result<()>;

    /// Ends the session gracefully.
    async fn quit(&self) -> Result<()>;

    /// Releases the session forcefully; last resort after `quit` failed.
    async fn dispose(&self) -> Result<()>;

    /// Returns the first match, polling for up to the implicit wait.
    async fn find_element(&self, by: &By) -> Result<ElementHandle> {
        let deadline = Instant::now() + self.implicit_wait();

        loop {
            if let Some(element) = self.find_elements(by).await?.into_iter().next() {
                return Ok(element);
            }

            if Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound {
                    locator: by.to_string(),
                });
            }

            sleep(DEFAULT_POLL_INTERVAL).await;
        }
    }
}
