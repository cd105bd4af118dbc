//! In-memory page for driving navigation code without a browser.
//!
//! Elements are plain ids. What a selector matches is declared per scope, so
//! a test only describes the part of the page the code under test looks at.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Element, Key, Locator, Navigator};
use crate::error::NavError;

#[derive(Default)]
pub struct FakeNav {
    matches: HashMap<(Option<String>, String), Vec<Element>>,
    texts: HashMap<String, String>,
    attributes: HashMap<(String, String), String>,
    hidden: HashSet<String>,
    broken: HashSet<String>,
    clicks: Mutex<Vec<String>>,
}

impl FakeNav {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ids` are what `selector` finds under `scope`, or in the document.
    pub fn matches<S: AsRef<str>>(&mut self, scope: Option<&str>, selector: &str, ids: &[S]) {
        self.matches.insert(
            (scope.map(str::to_string), selector.to_string()),
            ids.iter().map(|id| Element(id.as_ref().to_string())).collect(),
        );
    }

    pub fn unmatch(&mut self, scope: Option<&str>, selector: &str) {
        self.matches
            .remove(&(scope.map(str::to_string), selector.to_string()));
    }

    pub fn set_text(&mut self, id: &str, text: &str) {
        self.texts.insert(id.to_string(), text.to_string());
    }

    /// Serves both `attribute` and `property` lookups.
    pub fn set_attr(&mut self, id: &str, name: &str, value: &str) {
        self.attributes
            .insert((id.to_string(), name.to_string()), value.to_string());
    }

    pub fn hide(&mut self, id: &str) {
        self.hidden.insert(id.to_string());
    }

    /// Reading this element's text fails as if it went stale.
    pub fn break_text(&mut self, id: &str) {
        self.broken.insert(id.to_string());
    }

    pub fn clicked(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    fn lookup(&self, el: &Element, name: &str) -> Option<String> {
        self.attributes
            .get(&(el.0.clone(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Navigator for FakeNav {
    async fn goto(&self, _url: &str) -> Result<(), NavError> {
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<&Element>,
        locator: &Locator,
    ) -> Result<Vec<Element>, NavError> {
        let key = (scope.map(|e| e.0.clone()), locator.describe().to_string());
        Ok(self.matches.get(&key).cloned().unwrap_or_default())
    }

    async fn text(&self, el: &Element) -> Result<String, NavError> {
        if self.broken.contains(&el.0) {
            return Err(NavError::Stale);
        }
        Ok(self.texts.get(&el.0).cloned().unwrap_or_default())
    }

    async fn attribute(&self, el: &Element, name: &str) -> Result<Option<String>, NavError> {
        Ok(self.lookup(el, name))
    }

    async fn property(&self, el: &Element, name: &str) -> Result<Option<String>, NavError> {
        Ok(self.lookup(el, name))
    }

    async fn is_displayed(&self, el: &Element) -> Result<bool, NavError> {
        Ok(!self.hidden.contains(&el.0))
    }

    async fn click(&self, el: &Element) -> Result<(), NavError> {
        self.clicks.lock().unwrap().push(el.0.clone());
        Ok(())
    }

    async fn hover(&self, _el: &Element) -> Result<(), NavError> {
        Ok(())
    }

    async fn clear(&self, _el: &Element) -> Result<(), NavError> {
        Ok(())
    }

    async fn type_text(&self, _el: &Element, _text: &str) -> Result<(), NavError> {
        Ok(())
    }

    async fn press(&self, _key: Key) -> Result<(), NavError> {
        Ok(())
    }

    async fn execute(&self, _script: &str, _args: Vec<Value>) -> Result<Value, NavError> {
        Ok(Value::Null)
    }

    async fn back(&self) -> Result<(), NavError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), NavError> {
        Ok(())
    }

    async fn pause(&self, _dur: Duration) {}
}
