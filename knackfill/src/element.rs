use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::webdriver::{BrowserEngine, ElementRef};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::Locator;

/// A live element inside a browser session
#[derive(Clone)]
pub struct WebElement {
    engine: Arc<dyn BrowserEngine>,
    reference: ElementRef,
    description: String,
}

impl fmt::Debug for WebElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebElement")
            .field("reference", &self.reference)
            .field("description", &self.description)
            .finish()
    }
}

impl WebElement {
    pub(crate) fn new(
        engine: Arc<dyn BrowserEngine>,
        reference: ElementRef,
        description: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            reference,
            description: description.into(),
        }
    }

    pub fn reference(&self) -> &ElementRef {
        &self.reference
    }

    /// Human readable origin of this element, usually the selector that found it
    pub fn description(&self) -> &str {
        &self.description
    }

    pub async fn is_displayed(&self) -> Result<bool, AutomationError> {
        self.engine.is_displayed(&self.reference).await
    }

    #[instrument(level = "debug", skip(self), fields(element = %self.description))]
    pub async fn click(&self) -> Result<(), AutomationError> {
        self.engine.click(&self.reference).await
    }

    pub async fn clear(&self) -> Result<(), AutomationError> {
        self.engine.clear(&self.reference).await
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.engine.send_keys(&self.reference, text).await
    }

    /// Type `text` one character per key event, the way a person would.
    /// Autocomplete widgets that debounce on keyup only react to this form.
    pub async fn type_chars(&self, text: &str) -> Result<(), AutomationError> {
        for ch in text.chars() {
            self.engine
                .send_keys(&self.reference, &ch.to_string())
                .await?;
        }
        Ok(())
    }

    /// Fire bubbling DOM events on this element
    pub async fn dispatch_events(&self, events: &[&str]) -> Result<(), AutomationError> {
        for event in events {
            let script =
                format!("arguments[0].dispatchEvent(new Event('{event}', {{ bubbles: true }}));");
            self.engine
                .execute_script(&script, std::slice::from_ref(&self.reference))
                .await?;
        }
        Ok(())
    }

    pub async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.engine
            .execute_script(
                "arguments[0].scrollIntoView(true);",
                std::slice::from_ref(&self.reference),
            )
            .await?;
        Ok(())
    }

    /// Click through the DOM instead of the pointer, bypassing overlays
    pub async fn js_click(&self) -> Result<(), AutomationError> {
        self.engine
            .execute_script("arguments[0].click();", std::slice::from_ref(&self.reference))
            .await?;
        Ok(())
    }

    /// Pick the `<option>` whose value attribute equals `value` from this `<select>`
    #[instrument(level = "debug", skip(self), fields(element = %self.description))]
    pub async fn select_by_value(&self, value: &str) -> Result<(), AutomationError> {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        let option = self
            .find_child(Selector::Css(format!("option[value=\"{escaped}\"]")))
            .await?
            .ok_or_else(|| {
                AutomationError::ElementNotFound(format!(
                    "No option with value '{value}' in {}",
                    self.description
                ))
            })?;
        debug!("Selecting option '{}' in {}", value, self.description);
        option.click().await
    }

    /// First child matching `selector` right now, without waiting for it
    pub async fn find_child(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<Option<WebElement>, AutomationError> {
        let selector = selector.into();
        let found = self
            .engine
            .find_elements(&selector, Some(&self.reference))
            .await?;
        Ok(found
            .into_iter()
            .next()
            .map(|reference| WebElement::new(self.engine.clone(), reference, selector.to_string())))
    }

    /// A locator scoped to the children of this element
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.engine.clone(), selector.into()).within(self.clone())
    }
}
