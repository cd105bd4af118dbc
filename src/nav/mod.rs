//! Navigation capability: the boundary between the harvester and whatever
//! drives the browser.

#[cfg(test)]
pub mod fake;
pub mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::NavError;

pub use webdriver::WebDriver;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to find an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(s: impl Into<String>) -> Self {
        Locator::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Locator::XPath(s.into())
    }

    pub fn describe(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

/// Opaque handle to a live DOM element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// In the DOM and displayed.
    Visible,
    /// Absent, or present but not displayed.
    Hidden,
}

/// Keys sent through the keyboard actions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
}

impl Key {
    pub fn code(self) -> char {
        match self {
            Key::Enter => '\u{E007}',
            Key::Escape => '\u{E00C}',
        }
    }
}

/// One page, one view at a time. Every wait is a cooperative sleep; every
/// failure is an ordinary `NavError`.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), NavError>;

    /// All matches, searched from `scope` when given, else from the document.
    async fn find_all(
        &self,
        scope: Option<&Element>,
        locator: &Locator,
    ) -> Result<Vec<Element>, NavError>;

    async fn text(&self, el: &Element) -> Result<String, NavError>;

    async fn attribute(&self, el: &Element, name: &str) -> Result<Option<String>, NavError>;

    /// Live DOM property, e.g. an input's current `value`.
    async fn property(&self, el: &Element, name: &str) -> Result<Option<String>, NavError>;

    async fn is_displayed(&self, el: &Element) -> Result<bool, NavError>;

    async fn click(&self, el: &Element) -> Result<(), NavError>;

    async fn hover(&self, el: &Element) -> Result<(), NavError>;

    async fn clear(&self, el: &Element) -> Result<(), NavError>;

    async fn type_text(&self, el: &Element, text: &str) -> Result<(), NavError>;

    async fn press(&self, key: Key) -> Result<(), NavError>;

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, NavError>;

    async fn back(&self) -> Result<(), NavError>;

    async fn close(&self) -> Result<(), NavError>;

    async fn find(
        &self,
        scope: Option<&Element>,
        locator: &Locator,
    ) -> Result<Option<Element>, NavError> {
        Ok(self.find_all(scope, locator).await?.into_iter().next())
    }

    async fn count(&self, scope: Option<&Element>, locator: &Locator) -> Result<usize, NavError> {
        Ok(self.find_all(scope, locator).await?.len())
    }

    /// First match that is currently displayed.
    async fn find_visible(&self, locator: &Locator) -> Result<Option<Element>, NavError> {
        for el in self.find_all(None, locator).await? {
            if self.is_displayed(&el).await.unwrap_or(false) {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }

    /// Poll until the first match of `locator` reaches `state`.
    async fn wait_for(
        &self,
        locator: &Locator,
        state: Visibility,
        timeout: Duration,
    ) -> Result<(), NavError> {
        let deadline = Instant::now() + timeout;
        loop {
            let visible = match self.find(None, locator).await? {
                Some(el) => self.is_displayed(&el).await.unwrap_or(false),
                None => false,
            };
            let reached = match state {
                Visibility::Visible => visible,
                Visibility::Hidden => !visible,
            };
            if reached {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(NavError::timeout(locator.describe()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn pause(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}
