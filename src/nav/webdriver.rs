use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Element, Key, Locator, Navigator};
use crate::error::NavError;

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecc";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--window-size=1920,1080",
];

/// Browser session driven through a WebDriver endpoint (chromedriver et al.).
pub struct WebDriver {
    client: Client,
    session_url: String,
}

impl WebDriver {
    /// Open a new Chrome session on the WebDriver server at `endpoint`.
    pub async fn connect(endpoint: &str, headless: bool) -> Result<Self, NavError> {
        let client = Client::new();
        let endpoint = endpoint.trim_end_matches('/');

        let mut args: Vec<String> = CHROME_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(format!("--user-agent={}", USER_AGENT));
        if headless {
            args.push("--headless=new".to_string());
        }
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let resp = client
            .post(format!("{}/session", endpoint))
            .json(&caps)
            .send()
            .await?;
        let value = unwrap_response(resp).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| NavError::Protocol("new session response lacks sessionId".into()))?;

        info!("Browser session {} opened (headless: {})", session_id, headless);
        Ok(WebDriver {
            session_url: format!("{}/session/{}", endpoint, session_id),
            client,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, NavError> {
        let url = format!("{}{}", self.session_url, path);
        debug!("webdriver {} {}", method, path);
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        unwrap_response(req.send().await?).await
    }

    async fn get(&self, path: &str) -> Result<Value, NavError> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, NavError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn actions(&self, source: Value) -> Result<(), NavError> {
        self.post("/actions", json!({ "actions": [source] })).await?;
        Ok(())
    }
}

#[async_trait]
impl Navigator for WebDriver {
    async fn goto(&self, url: &str) -> Result<(), NavError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<&Element>,
        locator: &Locator,
    ) -> Result<Vec<Element>, NavError> {
        let path = match scope {
            Some(el) => format!("/element/{}/elements", el.0),
            None => "/elements".to_string(),
        };
        let value = self.post(&path, locator_body(locator)).await?;
        element_ids(&value)
    }

    async fn text(&self, el: &Element) -> Result<String, NavError> {
        let value = self.get(&format!("/element/{}/text", el.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, el: &Element, name: &str) -> Result<Option<String>, NavError> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", el.0, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn property(&self, el: &Element, name: &str) -> Result<Option<String>, NavError> {
        let value = self
            .get(&format!("/element/{}/property/{}", el.0, name))
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn is_displayed(&self, el: &Element) -> Result<bool, NavError> {
        let value = self.get(&format!("/element/{}/displayed", el.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, el: &Element) -> Result<(), NavError> {
        self.post(&format!("/element/{}/click", el.0), json!({})).await?;
        Ok(())
    }

    async fn hover(&self, el: &Element) -> Result<(), NavError> {
        self.actions(json!({
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [{
                "type": "pointerMove",
                "duration": 100,
                "origin": { ELEMENT_KEY: el.0 },
                "x": 0,
                "y": 0
            }]
        }))
        .await
    }

    async fn clear(&self, el: &Element) -> Result<(), NavError> {
        self.post(&format!("/element/{}/clear", el.0), json!({})).await?;
        Ok(())
    }

    async fn type_text(&self, el: &Element, text: &str) -> Result<(), NavError> {
        self.post(&format!("/element/{}/value", el.0), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn press(&self, key: Key) -> Result<(), NavError> {
        let code = key.code().to_string();
        self.actions(json!({
            "type": "key",
            "id": "keyboard",
            "actions": [
                { "type": "keyDown", "value": code },
                { "type": "keyUp", "value": code }
            ]
        }))
        .await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, NavError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn back(&self) -> Result<(), NavError> {
        self.post("/back", json!({})).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), NavError> {
        self.command(Method::DELETE, "", None).await?;
        info!("Browser session closed");
        Ok(())
    }
}

fn locator_body(locator: &Locator) -> Value {
    match locator {
        Locator::Css(s) => json!({ "using": "css selector", "value": s }),
        Locator::XPath(s) => json!({ "using": "xpath", "value": s }),
    }
}

fn element_ids(value: &Value) -> Result<Vec<Element>, NavError> {
    let items = value
        .as_array()
        .ok_or_else(|| NavError::Protocol(format!("expected element list, got {}", value)))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Element(id.to_string()))
                .ok_or_else(|| NavError::Protocol(format!("not a web element: {}", item)))
        })
        .collect()
}

async fn unwrap_response(resp: reqwest::Response) -> Result<Value, NavError> {
    let status = resp.status();
    let mut payload: Value = resp.json().await?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Err(map_error(error, message))
}

fn map_error(error: &str, message: &str) -> NavError {
    match error {
        "no such element" => NavError::not_found(message),
        "stale element reference" => NavError::Stale,
        "timeout" | "script timeout" => NavError::timeout(message),
        _ => NavError::WebDriver {
            error: error.to_string(),
            message: message.to_string(),
        },
    }
}
