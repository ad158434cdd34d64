//! Local chromedriver process management
//!
//! Workers normally connect to an already running WebDriver server. When a
//! chromedriver binary is given instead, one process is spawned and shared by
//! every worker session; it is killed when the handle is dropped.

use crate::AutomationError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const READY_TIMEOUT: Duration = Duration::from_secs(20);
const READY_POLL: Duration = Duration::from_millis(250);

pub struct ChromeDriver {
    child: Child,
    url: String,
}

impl ChromeDriver {
    /// Spawn `chromedriver --port=<port>` and wait until its `/status` reports ready.
    pub async fn spawn(binary: &Path, port: u16) -> Result<Self, AutomationError> {
        info!("🚗 Starting chromedriver {} on port {}", binary.display(), port);
        let child = Command::new(binary)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AutomationError::SessionNotCreated(format!(
                    "Failed to start chromedriver at {}: {e}",
                    binary.display()
                ))
            })?;

        let driver = Self {
            child,
            url: format!("http://127.0.0.1:{port}"),
        };
        driver.wait_ready(READY_TIMEOUT).await?;
        Ok(driver)
    }

    /// Base URL of the WebDriver server
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), AutomationError> {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if is_ready(&client, &self.url).await {
                info!("✅ chromedriver ready at {}", self.url);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "chromedriver at {} not ready after {timeout:?}",
                    self.url
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Stop the process now instead of waiting for drop
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("chromedriver already exited: {}", e);
        }
    }
}

/// True when the WebDriver server at `base_url` answers `/status` with `ready: true`
pub async fn is_ready(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/status", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) => match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .pointer("/value/ready")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            Err(_) => false,
        },
        Err(_) => false,
    }
}
