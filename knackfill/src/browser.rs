use crate::element::WebElement;
use crate::errors::AutomationError;
use crate::locator::{Locator, DEFAULT_LOCATOR_TIMEOUT};
use crate::selector::Selector;
use crate::webdriver::{BrowserEngine, Key, WebDriverEngine};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// How a browser session is created
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Base URL of the WebDriver server (chromedriver)
    pub webdriver_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Chrome profile directory; one per session so parallel browsers never share state
    pub profile_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Upper bound on any single WebDriver HTTP command
    pub command_timeout: Duration,
    /// Default wait used by locators created from this browser
    pub locator_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_size: (1920, 1080),
            profile_dir: None,
            extra_args: Vec::new(),
            command_timeout: Duration::from_secs(60),
            locator_timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }
}

impl BrowserConfig {
    /// Chrome command line switches for this configuration
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
        ];
        if self.headless {
            args.extend(
                [
                    "--headless=new",
                    "--disable-gpu",
                    "--log-level=3",
                    "--disable-extensions",
                ]
                .map(String::from),
            );
            let (w, h) = self.window_size;
            args.push(format!("--window-size={w},{h}"));
        }
        if let Some(dir) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// W3C capabilities object sent when creating the session
    pub fn capabilities(&self) -> Value {
        json!({
            "browserName": "chrome",
            "goog:chromeOptions": {
                "args": self.chrome_args(),
                "excludeSwitches": ["enable-automation"],
                "useAutomationExtension": false,
            }
        })
    }
}

/// The main entry point for page automation
#[derive(Clone)]
pub struct Browser {
    engine: Arc<dyn BrowserEngine>,
    locator_timeout: Duration,
}

impl Browser {
    /// Wrap an existing engine, e.g. a session created elsewhere
    pub fn from_engine(engine: Arc<dyn BrowserEngine>) -> Self {
        Self {
            engine,
            locator_timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Start a new WebDriver session and size its window
    #[instrument(skip(config))]
    pub async fn launch(config: &BrowserConfig) -> Result<Self, AutomationError> {
        let engine = WebDriverEngine::new_session(config).await?;
        let (w, h) = config.window_size;
        if let Err(e) = engine.set_window_size(w, h).await {
            warn!("Could not resize browser window: {}", e);
        }
        Ok(Self {
            engine: Arc::new(engine),
            locator_timeout: config.locator_timeout,
        })
    }

    pub fn engine(&self) -> Arc<dyn BrowserEngine> {
        self.engine.clone()
    }

    #[instrument(skip(self))]
    pub async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.engine.navigate(url).await
    }

    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.engine.clone(), selector.into()).set_default_timeout(self.locator_timeout)
    }

    /// The element holding keyboard focus
    pub async fn active_element(&self) -> Result<Option<WebElement>, AutomationError> {
        Ok(self
            .engine
            .active_element()
            .await?
            .map(|r| WebElement::new(self.engine.clone(), r, "document.activeElement")))
    }

    pub async fn execute_script(&self, script: &str) -> Result<Value, AutomationError> {
        self.engine.execute_script(script, &[]).await
    }

    pub async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        self.engine.press_key(key).await
    }

    pub async fn quit(&self) -> Result<(), AutomationError> {
        self.engine.quit().await
    }
}

/// Opens a fresh browser bound to a profile directory
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile_dir: &Path) -> Result<Browser, AutomationError>;
}

/// Launches Chrome sessions through a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    base: BrowserConfig,
}

impl WebDriverLauncher {
    pub fn new(base: BrowserConfig) -> Self {
        Self { base }
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, profile_dir: &Path) -> Result<Browser, AutomationError> {
        let config = BrowserConfig {
            profile_dir: Some(profile_dir.to_path_buf()),
            ..self.base.clone()
        };
        info!("[Driver] Using user-data-dir: {}", profile_dir.display());
        Browser::launch(&config).await
    }
}
