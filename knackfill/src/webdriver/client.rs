use super::{BrowserEngine, ElementRef, Key};
use crate::browser::BrowserConfig;
use crate::{AutomationError, Selector};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

/// Lightweight W3C WebDriver client bound to a single session
#[derive(Debug, Clone)]
pub struct WebDriverEngine {
    base_url: String,
    session_id: String,
    client: reqwest::Client,
}

impl WebDriverEngine {
    /// Create a new browser session on the WebDriver server named in `config`
    #[instrument(skip(config), fields(webdriver = %config.webdriver_url))]
    pub async fn new_session(config: &BrowserConfig) -> Result<Self, AutomationError> {
        let client = reqwest::Client::builder()
            .timeout(config.command_timeout)
            .build()?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let body = json!({
            "capabilities": {
                "alwaysMatch": config.capabilities(),
            }
        });
        let response = client
            .post(format!("{base_url}/session"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AutomationError::SessionNotCreated(format!(
                    "WebDriver server at {base_url} is unreachable: {e}"
                ))
            })?;
        let value = decode(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AutomationError::SessionNotCreated("Response carried no sessionId".to_string())
            })?
            .to_string();
        info!("🌐 Browser session {} created", session_id);

        Ok(Self {
            base_url,
            session_id,
            client,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AutomationError> {
        let url = self.url(path);
        debug!(%method, %url, "WebDriver command");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        decode(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AutomationError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value, AutomationError> {
        self.command(Method::GET, path, None).await
    }
}

/// Unwraps the `value` member of a WebDriver response, turning error payloads into errors
async fn decode(response: reqwest::Response) -> Result<Value, AutomationError> {
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| {
        AutomationError::Http(format!("Failed to parse WebDriver response ({status}): {e}"))
    })?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if let Some(code) = value.get("error").and_then(|v| v.as_str()) {
        let message = value
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        return Err(AutomationError::from_webdriver(code, message));
    }
    if !status.is_success() {
        return Err(AutomationError::Http(format!(
            "WebDriver returned {status} without an error payload"
        )));
    }
    Ok(value)
}

fn element_list(value: Value) -> Result<Vec<ElementRef>, AutomationError> {
    let items = value.as_array().ok_or_else(|| {
        AutomationError::Internal(format!("Expected element array, got {value}"))
    })?;
    items
        .iter()
        .map(|item| {
            ElementRef::from_json(item).ok_or_else(|| {
                AutomationError::Internal(format!("Malformed element reference: {item}"))
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl BrowserEngine for WebDriverEngine {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&ElementRef>,
    ) -> Result<Vec<ElementRef>, AutomationError> {
        let (using, value) = selector.strategy()?;
        let path = match root {
            Some(root) => format!("/element/{}/elements", root.0),
            None => "/elements".to_string(),
        };
        let found = self
            .post(&path, json!({ "using": using, "value": value }))
            .await?;
        element_list(found)
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let value = self
            .get(&format!("/element/{}/displayed", element.0))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        self.post(
            &format!("/element/{}/value", element.0),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<ElementRef>, AutomationError> {
        match self.get("/element/active").await {
            Ok(value) => Ok(ElementRef::from_json(&value)),
            Err(AutomationError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn execute_script(
        &self,
        script: &str,
        args: &[ElementRef],
    ) -> Result<Value, AutomationError> {
        let args: Vec<Value> = args.iter().map(ElementRef::to_json).collect();
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        let code = key.code_point().to_string();
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": code },
                    { "type": "keyUp", "value": code },
                ]
            }]
        });
        self.post("/actions", actions).await?;
        if let Err(e) = self.command(Method::DELETE, "/actions", None).await {
            warn!("Failed to release input state: {}", e);
        }
        Ok(())
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), AutomationError> {
        self.post("/window/rect", json!({ "width": width, "height": height }))
            .await?;
        Ok(())
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self.client.delete(&url).send().await?;
        decode(response).await?;
        info!("🛑 Browser session {} closed", self.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdriver::ELEMENT_KEY;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> WebDriverEngine {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc", "capabilities": {} }
            })))
            .mount(server)
            .await;
        let config = BrowserConfig {
            webdriver_url: server.uri(),
            ..BrowserConfig::default()
        };
        WebDriverEngine::new_session(&config).await.unwrap()
    }

    #[tokio::test]
    async fn creates_session_with_chrome_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "excludeSwitches": ["enable-automation"] }
                }}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s-1", "capabilities": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = BrowserConfig {
            webdriver_url: format!("{}/", server.uri()),
            ..BrowserConfig::default()
        };
        let engine = WebDriverEngine::new_session(&config).await.unwrap();
        assert_eq!(engine.session_id(), "s-1");
    }

    #[tokio::test]
    async fn find_elements_decodes_references() {
        let server = MockServer::start().await;
        let engine = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc/elements"))
            .and(body_partial_json(json!({ "using": "xpath", "value": "//button" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { ELEMENT_KEY: "e1" }, { ELEMENT_KEY: "e2" } ]
            })))
            .mount(&server)
            .await;

        let found = engine
            .find_elements(&Selector::XPath("//button".into()), None)
            .await
            .unwrap();
        assert_eq!(found, vec![ElementRef("e1".into()), ElementRef("e2".into())]);
    }

    #[tokio::test]
    async fn stale_error_payload_maps_to_stale_element() {
        let server = MockServer::start().await;
        let engine = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc/element/e9/click"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": {
                    "error": "stale element reference",
                    "message": "element is not attached to the page document",
                    "stacktrace": ""
                }
            })))
            .mount(&server)
            .await;

        let err = engine.click(&ElementRef("e9".into())).await.unwrap_err();
        assert!(err.is_stale(), "expected stale error, got {err:?}");
    }

    #[tokio::test]
    async fn missing_active_element_is_none() {
        let server = MockServer::start().await;
        let engine = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/session/abc/element/active"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "no focus" }
            })))
            .mount(&server)
            .await;

        assert_eq!(engine.active_element().await.unwrap(), None);
    }

    #[tokio::test]
    async fn execute_script_passes_element_arguments() {
        let server = MockServer::start().await;
        let engine = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc/execute/sync"))
            .and(body_partial_json(json!({
                "args": [ { ELEMENT_KEY: "e3" } ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 42 })))
            .expect(1)
            .mount(&server)
            .await;

        let value = engine
            .execute_script("return 42;", &[ElementRef("e3".into())])
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn press_key_sends_action_chain_and_releases() {
        let server = MockServer::start().await;
        let engine = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc/actions"))
            .and(body_partial_json(json!({
                "actions": [{ "type": "key", "id": "keyboard" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc/actions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        engine.press_key(Key::F12).await.unwrap();
    }
}
