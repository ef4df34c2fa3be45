//! Wait conditions.
//!
//! A [`Condition`] is a pure probe over a driver: it returns `Ok(Some(value))`
//! once satisfied and `Ok(None)` while it is not yet. Polling, intervals and
//! timeouts belong to [`crate::wait::Wait`].
//!
//! [`AllOf`] and [`AnyOf`] compose conditions through the type-erased
//! [`Probe`] trait, which every condition implements. Errors from a member are
//! absorbed: `AllOf` treats the poll as unsatisfied, `AnyOf` moves on to the
//! next member. Detached nodes in the middle of a re-render therefore never
//! abort the surrounding wait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::trace;

use crate::driver::{By, ElementHandle, WebDriver};
use crate::error::{BrowserError, Result};

#[async_trait]
pub trait Condition: Send + Sync {
    type Output: Send;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<Self::Output>>;

    /// Human-readable description used in timeout errors.
    fn describe(&self) -> String;
}

/// Boolean view of a condition, used for composition.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, driver: &dyn WebDriver) -> Result<bool>;

    fn label(&self) -> String;
}

#[async_trait]
impl<C> Probe for C
where
    C: Condition,
{
    async fn probe(&self, driver: &dyn WebDriver) -> Result<bool> {
        Ok(self.check(driver).await?.is_some())
    }

    fn label(&self) -> String {
        self.describe()
    }
}

/// Satisfied when every member is satisfied on the same poll.
#[derive(Default)]
pub struct AllOf {
    conditions: Vec<Box<dyn Probe>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, condition: impl Probe + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }
}

#[async_trait]
impl Condition for AllOf {
    type Output = bool;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<bool>> {
        for condition in &self.conditions {
            match condition.probe(driver).await {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(err) => {
                    trace!(condition = %condition.label(), error = %err, "all-of member failed");
                    return Ok(None);
                }
            }
        }
        Ok(Some(true))
    }

    fn describe(&self) -> String {
        format!("all of [{}]", labels(&self.conditions))
    }
}

/// Satisfied when any member is satisfied.
#[derive(Default)]
pub struct AnyOf {
    conditions: Vec<Box<dyn Probe>>,
}

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, condition: impl Probe + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }
}

#[async_trait]
impl Condition for AnyOf {
    type Output = bool;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<bool>> {
        for condition in &self.conditions {
            match condition.probe(driver).await {
                Ok(true) => return Ok(Some(true)),
                Ok(false) => {}
                Err(err) => {
                    trace!(condition = %condition.label(), error = %err, "any-of member skipped");
                }
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("any of [{}]", labels(&self.conditions))
    }
}

fn labels(conditions: &[Box<dyn Probe>]) -> String {
    conditions
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Closure-backed boolean condition.
pub struct Predicate<F> {
    description: String,
    func: F,
}

#[async_trait]
impl<F> Condition for Predicate<F>
where
    F: for<'a> Fn(&'a dyn WebDriver) -> BoxFuture<'a, Result<bool>> + Send + Sync,
{
    type Output = bool;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<bool>> {
        Ok((self.func)(driver).await?.then_some(true))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Wraps a closure as a condition.
///
/// ```ignore
/// let cond = predicate("title is Home", |d| Box::pin(async move {
///     Ok(d.title().await? == "Home")
/// }));
/// ```
pub fn predicate<F>(description: impl Into<String>, func: F) -> Predicate<F>
where
    F: for<'a> Fn(&'a dyn WebDriver) -> BoxFuture<'a, Result<bool>> + Send + Sync,
{
    Predicate {
        description: description.into(),
        func,
    }
}

pub struct AttributeToBe {
    by: By,
    attribute: String,
    expected: String,
}

#[async_trait]
impl Condition for AttributeToBe {
    type Output = ElementHandle;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<ElementHandle>> {
        let Some(element) = driver.find_elements(&self.by).await?.into_iter().next() else {
            return Ok(None);
        };
        let actual = element.attribute(&self.attribute).await?;
        Ok((actual.as_deref() == Some(self.expected.as_str())).then_some(element))
    }

    fn describe(&self) -> String {
        format!("{} to have {}='{}'", self.by, self.attribute, self.expected)
    }
}

/// First element matching `by` has `attribute` equal to `expected`.
pub fn attribute_to_be(
    by: By,
    attribute: impl Into<String>,
    expected: impl Into<String>,
) -> AttributeToBe {
    AttributeToBe {
        by,
        attribute: attribute.into(),
        expected: expected.into(),
    }
}

pub struct ElementCount {
    by: By,
    count: usize,
    at_least: bool,
}

#[async_trait]
impl Condition for ElementCount {
    type Output = Vec<ElementHandle>;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<Vec<ElementHandle>>> {
        let elements = driver.find_elements(&self.by).await?;
        let satisfied = if self.at_least {
            elements.len() >= self.count
        } else {
            elements.len() == self.count
        };
        Ok(satisfied.then_some(elements))
    }

    fn describe(&self) -> String {
        let relation = if self.at_least { "at least" } else { "exactly" };
        format!("{relation} {} elements for {}", self.count, self.by)
    }
}

pub fn element_count_to_be(by: By, count: usize) -> ElementCount {
    ElementCount {
        by,
        count,
        at_least: false,
    }
}

pub fn element_count_at_least(by: By, count: usize) -> ElementCount {
    ElementCount {
        by,
        count,
        at_least: true,
    }
}

pub struct TextToChange {
    by: By,
    baseline: String,
}

#[async_trait]
impl Condition for TextToChange {
    type Output = String;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<String>> {
        let Some(element) = driver.find_elements(&self.by).await?.into_iter().next() else {
            return Ok(None);
        };
        let text = element.text().await?;
        Ok((text != self.baseline).then_some(text))
    }

    fn describe(&self) -> String {
        format!("text of {} to change from '{}'", self.by, self.baseline)
    }
}

/// Yields the new text once it differs from `baseline`.
pub fn text_to_change(by: By, baseline: impl Into<String>) -> TextToChange {
    TextToChange {
        by,
        baseline: baseline.into(),
    }
}

pub struct StalenessOf {
    element: ElementHandle,
}

#[async_trait]
impl Condition for StalenessOf {
    type Output = bool;

    async fn check(&self, _driver: &dyn WebDriver) -> Result<Option<bool>> {
        match self.element.is_attached().await {
            Ok(true) => Ok(None),
            Ok(false) | Err(BrowserError::StaleElement(_) | BrowserError::ElementNotFound { .. }) => {
                Ok(Some(true))
            }
            Err(err) => Err(err),
        }
    }

    fn describe(&self) -> String {
        format!("staleness of {:?}", self.element)
    }
}

pub fn staleness_of(element: ElementHandle) -> StalenessOf {
    StalenessOf { element }
}

pub struct ScriptReturnsTrue {
    script: String,
}

#[async_trait]
impl Condition for ScriptReturnsTrue {
    type Output = bool;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<bool>> {
        let value = driver.execute_script(&self.script).await?;
        Ok((value.as_bool() == Some(true)).then_some(true))
    }

    fn describe(&self) -> String {
        format!("script `{}` to return true", self.script)
    }
}

/// Evaluates a JavaScript expression; satisfied when it yields `true`.
pub fn script_returns_true(script: impl Into<String>) -> ScriptReturnsTrue {
    ScriptReturnsTrue {
        script: script.into(),
    }
}

pub struct DocumentReady;

#[async_trait]
impl Condition for DocumentReady {
    type Output = bool;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<bool>> {
        let state = driver.execute_script("document.readyState").await?;
        Ok((state.as_str() == Some("complete")).then_some(true))
    }

    fn describe(&self) -> String {
        "document ready".to_string()
    }
}

pub fn document_ready() -> DocumentReady {
    DocumentReady
}

pub struct FirstItemRendered {
    list: By,
    item: By,
}

#[async_trait]
impl Condition for FirstItemRendered {
    type Output = ElementHandle;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<ElementHandle>> {
        let Some(list) = driver.find_elements(&self.list).await?.into_iter().next() else {
            return Ok(None);
        };
        let Some(first) = list.find_elements(&self.item).await?.into_iter().next() else {
            return Ok(None);
        };
        if first.is_displayed().await? && !first.text().await?.trim().is_empty() {
            Ok(Some(first))
        } else {
            Ok(None)
        }
    }

    fn describe(&self) -> String {
        format!("first {} of {} to render", self.item, self.list)
    }
}

/// First `item` inside the first `list` match is visible with non-blank text.
pub fn first_item_rendered(list: By, item: By) -> FirstItemRendered {
    FirstItemRendered { list, item }
}

pub struct ElementState {
    by: By,
    require_enabled: bool,
}

#[async_trait]
impl Condition for ElementState {
    type Output = ElementHandle;

    async fn check(&self, driver: &dyn WebDriver) -> Result<Option<ElementHandle>> {
        for element in driver.find_elements(&self.by).await? {
            if !element.is_displayed().await? {
                continue;
            }
            if self.require_enabled && !element.is_enabled().await? {
                continue;
            }
            return Ok(Some(element));
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        let state = if self.require_enabled {
            "clickable"
        } else {
            "visible"
        };
        format!("{} to be {state}", self.by)
    }
}

pub fn element_visible(by: By) -> ElementState {
    ElementState {
        by,
        require_enabled: false,
    }
}

pub fn element_clickable(by: By) -> ElementState {
    ElementState {
        by,
        require_enabled: true,
    }
}
