// src/browser/webdriver.rs
//
// Minimal W3C WebDriver client: just the commands the harvester issues.

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::{Browser, ElementHandle, Locator};
use crate::{
    config::BrowserKind,
    error::{HarvestError, Result},
};

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// A decoded WebDriver reply.
#[derive(Debug, PartialEq)]
enum Reply {
    Value(Value),
    Error { error: String, message: String },
}

impl Reply {
    fn from_payload(success: bool, payload: Value) -> Reply {
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        let error = value.get("error").and_then(Value::as_str).map(str::to_string);
        match (success, error) {
            (true, None) => Reply::Value(value),
            (_, error) => Reply::Error {
                error: error.unwrap_or_else(|| "unknown error".to_string()),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        }
    }
}

/// Session capabilities for `kind`, always with `--disable-gpu`.
pub fn capabilities(kind: BrowserKind, headless: bool) -> Value {
    let mut args = Vec::new();
    if headless {
        args.push("--headless");
    }
    args.push("--disable-gpu");

    let (name, options_key) = match kind {
        BrowserKind::Edge => ("MicrosoftEdge", "ms:edgeOptions"),
        BrowserKind::Chrome => ("chrome", "goog:chromeOptions"),
        BrowserKind::Firefox => ("firefox", "moz:firefoxOptions"),
    };
    let mut always = serde_json::Map::new();
    always.insert("browserName".into(), json!(name));
    always.insert(options_key.into(), json!({ "args": args }));
    json!({ "capabilities": { "alwaysMatch": Value::Object(always) } })
}

/// CSS selector for a single class name, escaping anything outside
/// `[A-Za-z0-9_-]`.
fn class_selector(class: &str) -> String {
    let mut out = String::with_capacity(class.len() + 1);
    out.push('.');
    for c in class.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

fn locator_body(locator: &Locator) -> Value {
    match locator {
        Locator::ClassName(c) => json!({ "using": "css selector", "value": class_selector(c) }),
        Locator::XPath(x) => json!({ "using": "xpath", "value": x }),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// New-session replies carry the id either under `value` (W3C) or at the
/// top level (legacy JSON wire protocol).
fn session_id(payload: &Value) -> Option<String> {
    payload
        .pointer("/value/sessionId")
        .or_else(|| payload.get("sessionId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub struct WebDriverBrowser {
    client: Client,
    base: Url,
    session_id: Option<String>,
}

impl WebDriverBrowser {
    /// Open a new browser session on the WebDriver server at `webdriver_url`.
    pub async fn connect(webdriver_url: &str, kind: BrowserKind, headless: bool) -> Result<Self> {
        let mut base = Url::parse(webdriver_url)
            .map_err(|e| HarvestError::Config(format!("webdriver url {}: {}", webdriver_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::new();

        let url = join(&base, "session")?;
        let resp = client
            .post(url)
            .json(&capabilities(kind, headless))
            .send()
            .await
            .map_err(|e| HarvestError::browser(format!("POST session: {}", e)))?;
        let success = resp.status().is_success();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| HarvestError::browser(format!("reading new session reply: {}", e)))?;

        let id = match (success, session_id(&payload)) {
            (true, Some(id)) => id,
            _ => {
                return Err(match Reply::from_payload(success, payload) {
                    Reply::Error { error, message } => {
                        HarvestError::browser(format!("new session: {}: {}", error, message))
                    }
                    Reply::Value(_) => HarvestError::browser("new session: no session id"),
                })
            }
        };
        info!(session = %id, browser = ?kind, headless, "browser session opened");

        Ok(Self {
            client,
            base,
            session_id: Some(id),
        })
    }

    fn session_path(&self, suffix: &str) -> Result<String> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| HarvestError::browser("session already closed"))?;
        Ok(format!("session/{}/{}", id, suffix))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Reply> {
        let url = join(&self.base, path)?;
        debug!(%method, %url, "webdriver command");
        let mut req = self.client.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| HarvestError::browser(format!("{} {}: {}", method, path, e)))?;
        let success = resp.status().is_success();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| HarvestError::browser(format!("{} {}: bad reply: {}", method, path, e)))?;
        Ok(Reply::from_payload(success, payload))
    }

    async fn command(&self, method: Method, suffix: &str, body: Option<Value>) -> Result<Value> {
        let path = self.session_path(suffix)?;
        match self.send(method, &path, body).await? {
            Reply::Value(v) => Ok(v),
            Reply::Error { error, message } => Err(HarvestError::browser(format!(
                "{}: {}: {}",
                path, error, message
            ))),
        }
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| HarvestError::browser(format!("bad webdriver path {}: {}", path, e)))
}

impl Browser for WebDriverBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let path = self.session_path("element")?;
        match self
            .send(Method::POST, &path, Some(locator_body(locator)))
            .await?
        {
            Reply::Value(v) => element_id(&v)
                .map(|id| Some(ElementHandle(id)))
                .ok_or_else(|| HarvestError::browser(format!("{}: reply without element", locator))),
            Reply::Error { error, .. } if error == "no such element" => Ok(None),
            Reply::Error { error, message } => Err(HarvestError::browser(format!(
                "find {}: {}: {}",
                locator, error, message
            ))),
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<()> {
        let suffix = format!("element/{}/click", element.0);
        self.command(Method::POST, &suffix, Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn page_source(&mut self) -> Result<String> {
        let v = self.command(Method::GET, "source", None).await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| HarvestError::browser("page source was not a string"))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(id) = self.session_id.clone() else {
            return Ok(());
        };
        let path = format!("session/{}", id);
        self.session_id = None;
        match self.send(Method::DELETE, &path, None).await? {
            Reply::Value(_) => {
                info!(session = %id, "browser session closed");
                Ok(())
            }
            Reply::Error { error, message } => {
                warn!(session = %id, %error, %message, "closing browser session failed");
                Err(HarvestError::browser(format!("close: {}: {}", error, message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use warp::{http::StatusCode, Filter};

    /// Local WebDriver stand-in: one session `s1`, no elements on the page.
    fn serve_driver(deletes: Arc<AtomicUsize>) -> String {
        let new_session = warp::post().and(warp::path!("session")).map(|| {
            warp::reply::json(&json!({ "value": { "sessionId": "s1", "capabilities": {} } }))
        });
        let missing = warp::post()
            .and(warp::path!("session" / String / "element"))
            .map(|_id: String| {
                warp::reply::with_status(
                    warp::reply::json(&json!({
                        "value": { "error": "no such element", "message": "no match", "stacktrace": "" }
                    })),
                    StatusCode::NOT_FOUND,
                )
            });
        let source = warp::get()
            .and(warp::path!("session" / String / "source"))
            .map(|_id: String| warp::reply::json(&json!({ "value": "<html></html>" })));
        let delete = warp::delete()
            .and(warp::path!("session" / String))
            .map(move |_id: String| {
                deletes.fetch_add(1, Ordering::SeqCst);
                warp::reply::json(&json!({ "value": null }))
            });

        let routes = new_session.or(missing).or(source).or(delete);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_session_round_trip_over_http() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let url = serve_driver(deletes.clone());

        let mut browser = WebDriverBrowser::connect(&url, BrowserKind::Edge, true)
            .await
            .unwrap();
        assert_eq!(browser.session_id.as_deref(), Some("s1"));

        // a 404 "no such element" reply means absent, not failed
        let found = browser
            .find_element(&Locator::class_name("bond_details_table"))
            .await
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(browser.page_source().await.unwrap(), "<html></html>");

        browser.close().await.unwrap();
        assert_eq!(browser.session_id, None);
        browser.close().await.unwrap();
        assert_eq!(deletes.load(Ordering::SeqCst), 1);

        let err = browser.page_source().await.unwrap_err();
        assert!(matches!(err, HarvestError::Browser(ref m) if m.contains("closed")), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_command_is_browser_error() {
        let url = serve_driver(Arc::new(AtomicUsize::new(0)));
        let mut browser = WebDriverBrowser::connect(&url, BrowserKind::Chrome, false)
            .await
            .unwrap();

        // no route for navigation: warp answers 404 without a JSON body
        let err = browser.navigate("https://example.com/").await.unwrap_err();
        assert!(matches!(err, HarvestError::Browser(_)), "{:?}", err);
    }

    #[test]
    fn test_edge_headless_capabilities() {
        let caps = capabilities(BrowserKind::Edge, true);
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/browserName"),
            Some(&json!("MicrosoftEdge"))
        );
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/ms:edgeOptions/args"),
            Some(&json!(["--headless", "--disable-gpu"]))
        );
    }

    #[test]
    fn test_headed_chrome_capabilities() {
        let caps = capabilities(BrowserKind::Chrome, false);
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/goog:chromeOptions/args"),
            Some(&json!(["--disable-gpu"]))
        );
    }

    #[test]
    fn test_locator_bodies() {
        assert_eq!(
            locator_body(&Locator::class_name("bond_details_table")),
            json!({ "using": "css selector", "value": ".bond_details_table" })
        );
        assert_eq!(
            locator_body(&Locator::xpath("//table//tr")),
            json!({ "using": "xpath", "value": "//table//tr" })
        );
        assert_eq!(class_selector("a.b"), ".a\\.b");
    }

    #[test]
    fn test_session_id_both_protocols() {
        let w3c = json!({ "value": { "sessionId": "abc", "capabilities": {} } });
        assert_eq!(session_id(&w3c).as_deref(), Some("abc"));
        let legacy = json!({ "sessionId": "old", "status": 0, "value": {} });
        assert_eq!(session_id(&legacy).as_deref(), Some("old"));
        assert_eq!(session_id(&json!({ "value": null })), None);
    }

    #[test]
    fn test_reply_decoding() {
        let ok = Reply::from_payload(true, json!({ "value": { "element-6066-11e4-a52e-4f735466cecf": "e1" } }));
        match ok {
            Reply::Value(v) => assert_eq!(element_id(&v).as_deref(), Some("e1")),
            other => panic!("unexpected {:?}", other),
        }

        let missing = Reply::from_payload(
            false,
            json!({ "value": { "error": "no such element", "message": "nope", "stacktrace": "" } }),
        );
        assert_eq!(
            missing,
            Reply::Error {
                error: "no such element".into(),
                message: "nope".into()
            }
        );

        let bare = Reply::from_payload(false, json!({}));
        assert!(matches!(bare, Reply::Error { ref error, .. } if error == "unknown error"));
    }
}
