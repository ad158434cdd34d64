use tracing::{debug, instrument, warn};

use crate::element::WebElement;
use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::webdriver::BrowserEngine;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A high-level API for finding and waiting on page elements
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn BrowserEngine>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
    root: Option<WebElement>,
}

impl Locator {
    /// Create a new locator with the given selector
    pub(crate) fn new(engine: Arc<dyn BrowserEngine>, selector: Selector) -> Self {
        Self {
            engine,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            root: None,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the root element for this locator
    pub fn within(mut self, element: WebElement) -> Self {
        self.root = Some(element);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn wrap(&self, reference: crate::webdriver::ElementRef) -> WebElement {
        WebElement::new(self.engine.clone(), reference, self.selector.to_string())
    }

    /// Get all elements currently matching this locator, without waiting.
    pub async fn all(&self) -> Result<Vec<WebElement>, AutomationError> {
        let root = self.root.as_ref().map(|r| r.reference());
        let found = self.engine.find_elements(&self.selector, root).await?;
        Ok(found.into_iter().map(|r| self.wrap(r)).collect())
    }

    /// Wait for an element matching the locator to be present, visible or not.
    pub async fn first(&self, timeout: Option<Duration>) -> Result<WebElement, AutomationError> {
        self.poll(timeout, false).await
    }

    /// Wait for an element matching the locator to be displayed, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_visible(
        &self,
        timeout: Option<Duration>,
    ) -> Result<WebElement, AutomationError> {
        self.poll(timeout, true).await
    }

    /// Like [`Locator::wait_visible`], but a timeout becomes `None` with a warning.
    /// Other errors still propagate.
    pub async fn try_wait_visible(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<WebElement>, AutomationError> {
        match self.wait_visible(timeout).await {
            Ok(element) => Ok(Some(element)),
            Err(AutomationError::Timeout(msg)) => {
                warn!("⚠️ wait for visible element failed: {}", msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn poll(
        &self,
        timeout: Option<Duration>,
        require_visible: bool,
    ) -> Result<WebElement, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = tokio::time::Instant::now() + effective_timeout;
        debug!("Waiting for element matching selector: {}", self.selector);

        loop {
            if let Some(element) = self.find_candidate(require_visible).await? {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {}",
                    self.selector
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One polling round. Elements that go stale mid-check count as not found yet.
    async fn find_candidate(
        &self,
        require_visible: bool,
    ) -> Result<Option<WebElement>, AutomationError> {
        let root = self.root.as_ref().map(|r| r.reference());
        let found = match self.engine.find_elements(&self.selector, root).await {
            Ok(found) => found,
            Err(e) if e.is_stale() => return Ok(None),
            Err(e) => return Err(e),
        };

        for reference in found {
            if !require_visible {
                return Ok(Some(self.wrap(reference)));
            }
            match self.engine.is_displayed(&reference).await {
                Ok(true) => return Ok(Some(self.wrap(reference))),
                Ok(false) => continue,
                Err(e) if e.is_stale() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
