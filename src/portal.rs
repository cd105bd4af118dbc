//! Site-level operations on the procurement portal's bid listing.
//!
//! The traversal controller only speaks `Portal`; `NuriPortal` maps each
//! operation onto concrete selectors through a `Navigator`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::NavError;
use crate::extract;
use crate::nav::{Element, Key, Locator, Navigator, Visibility};
use crate::record::{ListingRow, RecordBody};
use crate::text::{clean_text, format_ymd, listing_date, DateWindow};

const LOADING_BAR: &str = "#___processbar2";
const MAIN_MENU: &str = "//*[text()[normalize-space(.)='입찰공고']]";
const LIST_MENU: &str = "//*[text()[normalize-space(.)='입찰공고목록']]";
const START_DATE: &str = "input[title*='시작 날짜']";
const END_DATE: &str = "input[title*='종료 날짜']";
const SEARCH_BUTTON: &str = "input[value='검색']";

const RESULT_ROW: &str = "tr.grid_body_row";
const RESULT_ID: &str = "td[col_id='bidPbancNum']";
const RESULT_TITLE: &str = "td[col_id='bidPbancNm'] a";
const DETAIL_MARKER: &str = "td[data-title='입찰공고번호']";
const LIST_BUTTON: &str = "input[value='목록']";

const CLOSE_CONTROLS: &str =
    ".w2window_close, .w2popup_close, input[value='닫기']";
const CLOSE_BUTTON: &str = "//button[contains(normalize-space(.), '닫기')]";
const HIDE_OVERLAYS: &str = r#"
    document.querySelectorAll(
        ".w2window, .w2modal, .w2popup_window, .w2modal_overlay, div[role='dialog'], #___processbar2"
    ).forEach(el => {
        el.style.display = 'none';
        el.style.visibility = 'hidden';
        el.style.zIndex = '-9999';
    });
"#;

const LOADING_TIMEOUT: Duration = Duration::from_secs(10);
const SHORT_LOADING_TIMEOUT: Duration = Duration::from_secs(5);
const DETAIL_TIMEOUT: Duration = Duration::from_secs(15);
const ROWS_TIMEOUT: Duration = Duration::from_secs(5);
const SEARCH_SETTLE: Duration = Duration::from_millis(1500);
const FIELD_SETTLE: Duration = Duration::from_millis(500);
const CLICK_SETTLE: Duration = Duration::from_millis(200);

/// One browser session positioned on the bid listing.
#[async_trait]
pub trait Portal: Send {
    /// Load the listing filtered to `window` and wait for results.
    async fn search(&mut self, window: &DateWindow) -> Result<(), NavError>;

    /// Cheap projection of every row on the current page. Empty when the page
    /// shows no result rows.
    async fn listing_rows(&mut self) -> Result<Vec<ListingRow>, NavError>;

    async fn open_detail(&mut self, row: &ListingRow) -> Result<(), NavError>;

    /// Sections and attachments of the open detail view.
    async fn extract_detail(&mut self) -> Result<RecordBody, NavError>;

    /// Leave the detail view through the page's own list control.
    async fn return_to_listing(&mut self) -> Result<(), NavError>;

    /// Get back to a rendered listing after a failed row.
    async fn recover_listing(&mut self) -> Result<(), NavError>;

    /// Move to page `next_page`. `false` when there is no further page.
    async fn advance(&mut self, next_page: u32) -> Result<bool, NavError>;

    async fn close(&mut self);
}

pub struct NuriPortal<N: Navigator> {
    nav: N,
    base_url: String,
    timeout: Duration,
}

impl<N: Navigator> NuriPortal<N> {
    pub fn new(nav: N, base_url: impl Into<String>, timeout: Duration) -> Self {
        NuriPortal {
            nav,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Best effort: Escape, every visible close control, then hide leftovers.
    async fn clear_overlays(&self) {
        let _ = self.nav.press(Key::Escape).await;
        for locator in [Locator::css(CLOSE_CONTROLS), Locator::xpath(CLOSE_BUTTON)] {
            let Ok(buttons) = self.nav.find_all(None, &locator).await else {
                continue;
            };
            for button in buttons {
                if self.nav.is_displayed(&button).await.unwrap_or(false)
                    && self.nav.click(&button).await.is_ok()
                {
                    self.nav.pause(CLICK_SETTLE).await;
                }
            }
        }
        if let Err(e) = self.nav.execute(HIDE_OVERLAYS, vec![]).await {
            debug!("Overlay hiding script failed: {}", e);
        }
    }

    async fn wait_loading(&self, timeout: Duration) {
        // The bar is sometimes never shown at all; a timeout here is not an error.
        let _ = self
            .nav
            .wait_for(&Locator::css(LOADING_BAR), Visibility::Hidden, timeout)
            .await;
    }

    async fn visible(&self, locator: &Locator) -> Result<Element, NavError> {
        self.nav
            .find_visible(locator)
            .await?
            .ok_or_else(|| NavError::not_found(locator.describe()))
    }

    async fn fill_date(&self, selector: &str, date: &str) -> Result<(), NavError> {
        let field = self.visible(&Locator::css(selector)).await?;
        self.nav.click(&field).await?;
        self.nav.clear(&field).await?;
        self.nav.type_text(&field, date).await?;
        self.nav.press(Key::Enter).await?;
        self.nav.pause(FIELD_SETTLE).await;
        Ok(())
    }

    async fn wait_for_results(&self) -> Result<(), NavError> {
        self.nav
            .wait_for(&Locator::css(RESULT_ID), Visibility::Visible, self.timeout)
            .await
    }

    async fn read_row(&self, index: usize, row: &Element) -> Result<Option<ListingRow>, NavError> {
        let id_cell = self.nav.find(Some(row), &Locator::css(RESULT_ID)).await?;
        let link = self.nav.find(Some(row), &Locator::css(RESULT_TITLE)).await?;
        let (Some(id_cell), Some(link)) = (id_cell, link) else {
            return Ok(None);
        };
        let id = clean_text(&self.nav.text(&id_cell).await?);
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(ListingRow {
            index,
            id,
            title: clean_text(&self.nav.text(&link).await?),
            posted_on: listing_date(&self.nav.text(row).await?),
        }))
    }
}

#[async_trait]
impl<N: Navigator> Portal for NuriPortal<N> {
    async fn search(&mut self, window: &DateWindow) -> Result<(), NavError> {
        info!("Search initiated: {}", window);
        self.nav.goto(&self.base_url).await?;
        self.wait_loading(LOADING_TIMEOUT).await;
        self.clear_overlays().await;

        let menu = self.visible(&Locator::xpath(MAIN_MENU)).await?;
        self.nav.hover(&menu).await?;
        let list_menu = self.visible(&Locator::xpath(LIST_MENU)).await?;
        self.nav.click(&list_menu).await?;

        self.nav
            .wait_for(&Locator::css(START_DATE), Visibility::Visible, self.timeout)
            .await?;
        self.fill_date(START_DATE, &format_ymd(window.start)).await?;
        self.fill_date(END_DATE, &format_ymd(window.end)).await?;

        let button = self.visible(&Locator::css(SEARCH_BUTTON)).await?;
        self.nav.click(&button).await?;
        self.nav.pause(SEARCH_SETTLE).await;
        self.wait_loading(SHORT_LOADING_TIMEOUT).await;
        self.wait_for_results().await?;
        info!("Search results loaded");
        Ok(())
    }

    async fn listing_rows(&mut self) -> Result<Vec<ListingRow>, NavError> {
        let rows_locator = Locator::css(RESULT_ROW);
        if let Err(NavError::Timeout { .. }) = self
            .nav
            .wait_for(&rows_locator, Visibility::Visible, ROWS_TIMEOUT)
            .await
        {
            return Ok(Vec::new());
        }
        let elements = self.nav.find_all(None, &rows_locator).await?;
        let mut rows = Vec::with_capacity(elements.len());
        for (index, el) in elements.iter().enumerate() {
            match self.read_row(index, el).await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => debug!(index, "Listing row without id or title link, ignored"),
                Err(e) => warn!(index, "Listing row unreadable, ignored: {}", e),
            }
        }
        Ok(rows)
    }

    async fn open_detail(&mut self, row: &ListingRow) -> Result<(), NavError> {
        // Handles from listing_rows go stale once a detail view has been visited.
        let rows = self.nav.find_all(None, &Locator::css(RESULT_ROW)).await?;
        let el = rows
            .get(row.index)
            .ok_or_else(|| NavError::not_found(format!("listing row {}", row.index)))?;
        let link = self
            .nav
            .find(Some(el), &Locator::css(RESULT_TITLE))
            .await?
            .ok_or_else(|| NavError::not_found(RESULT_TITLE))?;
        self.nav.click(&link).await?;
        self.nav
            .wait_for(&Locator::css(DETAIL_MARKER), Visibility::Visible, DETAIL_TIMEOUT)
            .await
    }

    async fn extract_detail(&mut self) -> Result<RecordBody, NavError> {
        extract::extract(&self.nav, self.timeout).await
    }

    async fn return_to_listing(&mut self) -> Result<(), NavError> {
        let button = self.visible(&Locator::css(LIST_BUTTON)).await?;
        self.nav.click(&button).await?;
        self.wait_for_results().await
    }

    async fn recover_listing(&mut self) -> Result<(), NavError> {
        self.nav.back().await?;
        self.wait_for_results().await
    }

    async fn advance(&mut self, next_page: u32) -> Result<bool, NavError> {
        self.clear_overlays().await;
        let page_link = Locator::css(format!(
            "a.w2pageList_control_label[index='{}']",
            next_page
        ));
        let next_group = Locator::css("#mf_wfm_container_pagelist_next_btn");

        if let Some(link) = self.nav.find_visible(&page_link).await? {
            debug!("Clicking page {}", next_page);
            self.nav.click(&link).await?;
        } else if let Some(button) = self.nav.find_visible(&next_group).await? {
            debug!("Clicking next page group");
            self.nav.click(&button).await?;
        } else {
            return Ok(false);
        }
        self.wait_loading(SHORT_LOADING_TIMEOUT).await;
        Ok(true)
    }

    async fn close(&mut self) {
        if let Err(e) = self.nav.close().await {
            warn!("Browser session close failed: {}", e);
        }
    }
}
