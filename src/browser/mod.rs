// src/browser/mod.rs

pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use serde_json::Value;

use crate::error::Result;

pub use webdriver::WebDriverBrowser;

/// How to find an element on the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    ClassName(String),
    XPath(String),
}

impl Locator {
    pub fn class_name(name: impl Into<String>) -> Self {
        Locator::ClassName(name.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::ClassName(c) => write!(f, "class {}", c),
            Locator::XPath(x) => write!(f, "xpath {}", x),
        }
    }
}

/// Opaque reference to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// The browser automation surface the harvester needs.
///
/// One implementation drives a real browser over WebDriver; tests use a
/// scripted fake. Calls mutate the page, so a browser is used by one
/// caller at a time.
#[allow(async_fn_in_trait)]
pub trait Browser {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Run `script` synchronously in the page. `args` are exposed to the
    /// script as `arguments[0..]`.
    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// `Ok(None)` when nothing matches.
    async fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn click(&mut self, element: &ElementHandle) -> Result<()>;

    /// Markup of the page as currently rendered.
    async fn page_source(&mut self) -> Result<String>;

    /// End the session. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
