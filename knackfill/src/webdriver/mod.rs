use crate::{AutomationError, Selector};
use serde_json::Value;

pub mod chromedriver;
pub mod client;

pub use chromedriver::ChromeDriver;
pub use client::WebDriverEngine;

/// W3C key identifying a web element reference in JSON payloads
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opaque reference to an element inside a browser session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn to_json(&self) -> Value {
        serde_json::json!({ ELEMENT_KEY: self.0 })
    }

    /// Extracts an element reference from a WebDriver JSON value, if it is one.
    pub fn from_json(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(|v| v.as_str())
            .map(|s| ElementRef(s.to_string()))
    }
}

/// Keys that can be pressed through the action chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    ArrowDown,
    F12,
}

impl Key {
    /// Code point from the WebDriver key table
    pub fn code_point(&self) -> char {
        match self {
            Key::Enter => '\u{E007}',
            Key::Tab => '\u{E004}',
            Key::Escape => '\u{E00C}',
            Key::ArrowDown => '\u{E015}',
            Key::F12 => '\u{E03C}',
        }
    }
}

/// The seam between the automation API and a concrete browser backend
#[async_trait::async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Navigate the current tab to `url`
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    /// Find all elements matching a selector, optionally scoped to `root`.
    /// Returns an empty list when nothing matches.
    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&ElementRef>,
    ) -> Result<Vec<ElementRef>, AutomationError>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError>;

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError>;

    /// The element that currently has focus, if the page reports one
    async fn active_element(&self) -> Result<Option<ElementRef>, AutomationError>;

    /// Run a synchronous script. Element arguments are available as `arguments[i]`.
    async fn execute_script(
        &self,
        script: &str,
        args: &[ElementRef],
    ) -> Result<Value, AutomationError>;

    /// Press and release a key on the page-level keyboard
    async fn press_key(&self, key: Key) -> Result<(), AutomationError>;

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), AutomationError>;

    /// End the session and close the browser
    async fn quit(&self) -> Result<(), AutomationError>;
}
