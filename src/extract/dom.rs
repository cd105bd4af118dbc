use std::time::Duration;

use tracing::{debug, warn};

use super::classify::RegionShape;
use super::parse::{CellSnapshot, GridRowSnapshot, GridSnapshot, TableRowSnapshot};
use crate::error::NavError;
use crate::nav::{Element, Locator, Navigator, Visibility};
use crate::text::clean_text;

pub(super) const PRIMARY_TAB: &str = "a[title='입찰공고일반']";
pub(super) const PRIMARY_TAB_ITEM: &str = "../..";
const PRIMARY_TAB_SELECTED: &str = "w2tabcontrol_selected";
pub(super) const PRIMARY_TAB_BODY: &str = "#mf_wfm_container_tabControl1_contents_content1_body";

pub(super) const SECTION_TITLE: &str = ".df_tit";
pub(super) const TITLE_BOX: &str = "ancestor::div[contains(@class, 'dfbox')][1]";
pub(super) const BODY_BOX: &str = "following-sibling::div[1]";
pub(super) const GRID: &str = "div.w2grid";
pub(super) const TABLE: &str = "table.w2tb";

const CHOSEN_OPTION: &str = "select option:checked";
const VALUE_INPUT: &str =
    "input:not([type='button']):not([type='submit']):not([type='hidden'])";

const TAB_SETTLE: Duration = Duration::from_millis(500);
const RENDER_SETTLE: Duration = Duration::from_millis(1000);

/// A labelled region of the detail view and the element holding its body.
#[derive(Debug, Clone)]
pub struct Region {
    pub title: String,
    pub text: String,
    pub shape: RegionShape,
    pub body: Option<Element>,
}

/// Switch to the general-information tab when the view opened on another one.
pub async fn ensure_primary_tab<N: Navigator + ?Sized>(
    nav: &N,
    timeout: Duration,
) -> Result<(), NavError> {
    let Some(tab) = nav.find(None, &Locator::css(PRIMARY_TAB)).await? else {
        return Ok(());
    };
    let selected = match nav.find(Some(&tab), &Locator::xpath(PRIMARY_TAB_ITEM)).await? {
        Some(item) => nav
            .attribute(&item, "class")
            .await?
            .is_some_and(|c| c.contains(PRIMARY_TAB_SELECTED)),
        None => false,
    };
    if !selected {
        debug!("Switching detail view to the primary tab");
        nav.click(&tab).await?;
        nav.wait_for(&Locator::css(PRIMARY_TAB_BODY), Visibility::Visible, timeout)
            .await?;
        nav.pause(TAB_SETTLE).await;
    }
    Ok(())
}

/// Scroll to the bottom so lazily rendered regions enter the DOM.
pub async fn render_full_height<N: Navigator + ?Sized>(nav: &N) -> Result<(), NavError> {
    nav.execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
        .await?;
    nav.pause(RENDER_SETTLE).await;
    Ok(())
}

/// Every visible section title with its body region. A title that cannot be
/// read is skipped without affecting the others.
pub async fn read_regions<N: Navigator + ?Sized>(nav: &N) -> Result<Vec<Region>, NavError> {
    let titles = nav.find_all(None, &Locator::css(SECTION_TITLE)).await?;
    let mut regions = Vec::with_capacity(titles.len());
    for (i, title_el) in titles.iter().enumerate() {
        match read_region(nav, title_el).await {
            Ok(Some(region)) => regions.push(region),
            Ok(None) => {}
            Err(e) => warn!(position = i, "Section title unreadable, skipped: {}", e),
        }
    }
    Ok(regions)
}

async fn read_region<N: Navigator + ?Sized>(
    nav: &N,
    title_el: &Element,
) -> Result<Option<Region>, NavError> {
    if !nav.is_displayed(title_el).await? {
        return Ok(None);
    }
    let title = clean_text(&nav.text(title_el).await?);
    if title.is_empty() {
        return Ok(None);
    }

    let body = match nav.find(Some(title_el), &Locator::xpath(TITLE_BOX)).await? {
        Some(title_box) => nav.find(Some(&title_box), &Locator::xpath(BODY_BOX)).await?,
        None => None,
    };
    let Some(body) = body else {
        return Ok(Some(Region {
            title,
            text: String::new(),
            shape: RegionShape::default(),
            body: None,
        }));
    };

    let visible = nav.is_displayed(&body).await?;
    let shape = RegionShape {
        present: true,
        visible,
        has_grid: nav.count(Some(&body), &Locator::css(GRID)).await? > 0,
        has_table: nav.count(Some(&body), &Locator::css(TABLE)).await? > 0,
    };
    let text = if visible {
        nav.text(&body).await?
    } else {
        String::new()
    };

    Ok(Some(Region {
        title,
        text,
        shape,
        body: Some(body),
    }))
}

/// Header labels and body rows of the first grid inside `body`.
pub async fn read_grid<N: Navigator + ?Sized>(
    nav: &N,
    body: &Element,
) -> Result<GridSnapshot, NavError> {
    let grid = nav
        .find(Some(body), &Locator::css(GRID))
        .await?
        .ok_or_else(|| NavError::not_found(GRID))?;

    let mut snapshot = GridSnapshot::default();
    if let Some(header) = nav.find(Some(&grid), &Locator::css("thead tr")).await? {
        for th in nav.find_all(Some(&header), &Locator::css("th")).await? {
            snapshot.headers.push(nav.text(&th).await?);
        }
    }
    if snapshot.headers.is_empty() {
        return Ok(snapshot);
    }

    for tr in nav.find_all(Some(&grid), &Locator::css("tbody tr")).await? {
        let text = nav.text(&tr).await?;
        let mut cells = Vec::new();
        for td in nav.find_all(Some(&tr), &Locator::css("td")).await? {
            cells.push(read_cell(nav, &td).await?);
        }
        snapshot.rows.push(GridRowSnapshot { text, cells });
    }
    Ok(snapshot)
}

/// Label and value cells of every row of the first key-value table inside `body`.
pub async fn read_table<N: Navigator + ?Sized>(
    nav: &N,
    body: &Element,
) -> Result<Vec<TableRowSnapshot>, NavError> {
    let table = nav
        .find(Some(body), &Locator::css(TABLE))
        .await?
        .ok_or_else(|| NavError::not_found(TABLE))?;

    let mut rows = Vec::new();
    for tr in nav.find_all(Some(&table), &Locator::css("tr")).await? {
        let mut row = TableRowSnapshot::default();
        for th in nav.find_all(Some(&tr), &Locator::css("th")).await? {
            row.labels.push(nav.text(&th).await?);
        }
        for td in nav.find_all(Some(&tr), &Locator::css("td")).await? {
            row.values.push(read_cell(nav, &td).await?);
        }
        rows.push(row);
    }
    Ok(rows)
}

async fn read_cell<N: Navigator + ?Sized>(nav: &N, cell: &Element) -> Result<CellSnapshot, NavError> {
    let selected = match nav.find(Some(cell), &Locator::css(CHOSEN_OPTION)).await? {
        Some(option) => Some(nav.text(&option).await?),
        None => None,
    };
    let input = match nav.find(Some(cell), &Locator::css(VALUE_INPUT)).await? {
        Some(input) => nav.property(&input, "value").await?,
        None => None,
    };
    Ok(CellSnapshot {
        selected,
        input,
        text: nav.text(cell).await?,
    })
}
