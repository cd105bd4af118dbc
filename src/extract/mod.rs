pub mod classify;
pub mod dom;
pub mod parse;

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::NavError;
use crate::nav::Navigator;
use crate::record::{RecordBody, SectionBody};
use classify::{classify, is_attachment_section, RegionKind};
use dom::Region;

/// Four-step pipeline over an open detail view:
/// tab → full render → regions → classified, parsed sections.
///
/// A section that fails to read or parse is left out; it never aborts the
/// rest of the record.
pub async fn extract<N: Navigator + ?Sized>(
    nav: &N,
    timeout: Duration,
) -> Result<RecordBody, NavError> {
    if let Err(e) = dom::ensure_primary_tab(nav, timeout).await {
        warn!("Primary tab switch failed: {}", e);
    }
    if let Err(e) = dom::render_full_height(nav).await {
        warn!("Full-height render failed: {}", e);
    }

    let regions = dom::read_regions(nav).await?;
    let mut body = RecordBody::default();
    for region in &regions {
        let kind = classify(&region.text, &region.shape);
        let section = match kind {
            RegionKind::NonData(reason) => {
                debug!(section = %region.title, "Skipping non-data region ({:?})", reason);
                continue;
            }
            kind => read_section(nav, region, kind).await,
        };
        match section {
            Ok(section) => place(&mut body, &region.title, section),
            Err(e) => warn!(section = %region.title, "Section parse failed, omitted: {}", e),
        }
    }
    Ok(body)
}

async fn read_section<N: Navigator + ?Sized>(
    nav: &N,
    region: &Region,
    kind: RegionKind,
) -> Result<SectionBody, NavError> {
    let el = region
        .body
        .as_ref()
        .ok_or_else(|| NavError::not_found(format!("body of '{}'", region.title)))?;
    match kind {
        RegionKind::RepeatingGrid => {
            let grid = dom::read_grid(nav, el).await?;
            Ok(SectionBody::Grid(parse::parse_grid(&grid)))
        }
        _ => {
            let rows = dom::read_table(nav, el).await?;
            Ok(SectionBody::KeyValue(parse::parse_key_value(&rows)))
        }
    }
}

/// File the parsed section under its title, or into the attachment list when
/// the title names attachments.
pub fn place(body: &mut RecordBody, title: &str, section: SectionBody) {
    if is_attachment_section(title) {
        if section.is_empty() {
            return;
        }
        match section {
            SectionBody::Grid(rows) => body.files.extend(rows),
            SectionBody::KeyValue(fields) => body.files.push(fields),
        }
        return;
    }
    body.sections.insert(title.to_string(), section);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::fake::FakeNav;
    use crate::record::Fields;
    use super::classify::Skip;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn attachment_grids_are_routed_to_files() {
        let mut body = RecordBody::default();
        place(
            &mut body,
            "첨부파일",
            SectionBody::Grid(vec![
                fields(&[("파일명", "공고문.pdf")]),
                fields(&[("파일명", "내역서.xlsx")]),
            ]),
        );
        place(
            &mut body,
            "공고일반",
            SectionBody::KeyValue(fields(&[("입찰방식", "전자입찰")])),
        );
        assert_eq!(body.files.len(), 2);
        assert_eq!(body.sections.len(), 1);
        assert!(body.sections.contains_key("공고일반"));
    }

    #[test]
    fn empty_attachment_table_adds_nothing() {
        let mut body = RecordBody::default();
        place(&mut body, "파일 정보", SectionBody::KeyValue(Fields::new()));
        assert!(body.files.is_empty());
        assert!(body.sections.is_empty());
    }

    #[test]
    fn sections_keep_page_order() {
        let mut body = RecordBody::default();
        for title in ["공고일반", "자격정보", "공동수급"] {
            place(&mut body, title, SectionBody::Grid(vec![]));
        }
        let titles: Vec<_> = body.sections.keys().map(String::as_str).collect();
        assert_eq!(titles, vec!["공고일반", "자격정보", "공동수급"]);
    }

    /// Title `t{n}` inside box `box{n}`, followed by body `b{n}`.
    fn titled_body(nav: &mut FakeNav, n: &str, title: &str) -> String {
        let (t, bx, b) = (format!("t{}", n), format!("box{}", n), format!("b{}", n));
        nav.set_text(&t, title);
        nav.matches(Some(t.as_str()), dom::TITLE_BOX, &[&bx]);
        nav.matches(Some(bx.as_str()), dom::BODY_BOX, &[&b]);
        b
    }

    fn key_value_section(nav: &mut FakeNav, n: &str, title: &str, pairs: &[(&str, &str)]) {
        let body = titled_body(nav, n, title);
        let text: Vec<String> = pairs.iter().map(|(k, v)| format!("{} {}", k, v)).collect();
        nav.set_text(&body, &text.join("\n"));
        let table = format!("tbl{}", n);
        nav.matches(Some(body.as_str()), dom::TABLE, &[&table]);
        let rows: Vec<String> = (0..pairs.len()).map(|i| format!("tr{}_{}", n, i)).collect();
        nav.matches(Some(table.as_str()), "tr", &rows[..]);
        for (i, (label, value)) in pairs.iter().enumerate() {
            let (th, td) = (format!("th{}_{}", n, i), format!("td{}_{}", n, i));
            nav.matches(Some(rows[i].as_str()), "th", &[&th]);
            nav.matches(Some(rows[i].as_str()), "td", &[&td]);
            nav.set_text(&th, label);
            nav.set_text(&td, value);
        }
    }

    fn grid_section(nav: &mut FakeNav, n: &str, title: &str, headers: &[&str], rows: &[&[&str]]) {
        let body = titled_body(nav, n, title);
        let lines: Vec<String> = rows.iter().map(|r| r.join(" ")).collect();
        nav.set_text(&body, &format!("{}\n{}", headers.join(" "), lines.join("\n")));
        let grid = format!("grid{}", n);
        nav.matches(Some(body.as_str()), dom::GRID, &[&grid]);
        if !headers.is_empty() {
            let head = format!("head{}", n);
            nav.matches(Some(grid.as_str()), "thead tr", &[&head]);
            let ths: Vec<String> = (0..headers.len()).map(|i| format!("gth{}_{}", n, i)).collect();
            nav.matches(Some(head.as_str()), "th", &ths[..]);
            for (th, label) in ths.iter().zip(headers) {
                nav.set_text(th, label);
            }
        }
        let trs: Vec<String> = (0..rows.len()).map(|i| format!("gtr{}_{}", n, i)).collect();
        nav.matches(Some(grid.as_str()), "tbody tr", &trs[..]);
        for (i, (tr, cells)) in trs.iter().zip(rows).enumerate() {
            nav.set_text(tr, &cells.join("\t"));
            let tds: Vec<String> = (0..cells.len()).map(|j| format!("gtd{}_{}_{}", n, i, j)).collect();
            nav.matches(Some(tr.as_str()), "td", &tds[..]);
            for (td, value) in tds.iter().zip(cells.iter()) {
                nav.set_text(td, value);
            }
        }
    }

    /// A detail view opened on a secondary tab, with one region of every kind.
    fn detail_page(tab_selected: bool) -> FakeNav {
        let mut nav = FakeNav::new();
        nav.matches(None, dom::PRIMARY_TAB, &["tab"]);
        nav.matches(Some("tab"), dom::PRIMARY_TAB_ITEM, &["tab_item"]);
        let class = if tab_selected {
            "w2tabcontrol_item w2tabcontrol_selected"
        } else {
            "w2tabcontrol_item"
        };
        nav.set_attr("tab_item", "class", class);
        nav.matches(None, dom::PRIMARY_TAB_BODY, &["tab_body"]);

        nav.matches(
            None,
            dom::SECTION_TITLE,
            &["t0", "t1", "t2", "t3", "t4", "t5", "t6"],
        );
        nav.set_text("t0", "숨은 영역");
        nav.hide("t0");
        key_value_section(
            &mut nav,
            "1",
            "공고일반",
            &[("입찰방식", "전자입찰"), ("계약방법", "제한경쟁")],
        );
        key_value_section(&mut nav, "2", "자격정보", &[("참가자격", "중소기업")]);
        nav.break_text("th2_0");
        key_value_section(&mut nav, "3", "개찰일정", &[("Sunday Monday Tuesday", "1 2 3")]);
        grid_section(
            &mut nav,
            "4",
            "첨부파일",
            &["No", "파일명"],
            &[&["1", "공고문.pdf"], &["2", "내역서.xlsx"]],
        );
        nav.set_text("t5", "공동수급");
        grid_section(&mut nav, "6", "참조", &[], &[&["x"]]);
        nav
    }

    #[tokio::test(start_paused = true)]
    async fn failed_region_does_not_take_its_siblings_down() {
        let nav = detail_page(false);
        let body = extract(&nav, Duration::from_secs(5)).await.unwrap();

        let titles: Vec<_> = body.sections.keys().map(String::as_str).collect();
        assert_eq!(titles, vec!["공고일반", "참조"]);
        let SectionBody::KeyValue(general) = &body.sections["공고일반"] else {
            panic!("expected key-value section");
        };
        assert_eq!(general["입찰방식"], "전자입찰");
        assert_eq!(general["계약방법"], "제한경쟁");
        assert!(body.sections["참조"].is_empty(), "header-less grid yields no rows");

        assert_eq!(body.files.len(), 2);
        assert_eq!(body.files[0]["파일명"], "공고문.pdf");
        assert!(!body.files[0].contains_key("No"));
        assert_eq!(nav.clicked(), vec!["tab"]);
    }

    #[tokio::test(start_paused = true)]
    async fn selected_primary_tab_is_left_alone() {
        let nav = detail_page(true);
        let body = extract(&nav, Duration::from_secs(5)).await.unwrap();
        assert!(nav.clicked().is_empty());
        assert_eq!(body.sections.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tab_switch_timeout_still_extracts() {
        let mut nav = detail_page(false);
        nav.unmatch(None, dom::PRIMARY_TAB_BODY);
        let body = extract(&nav, Duration::from_secs(5)).await.unwrap();
        assert_eq!(nav.clicked(), vec!["tab"]);
        assert!(body.sections.contains_key("공고일반"));
        assert_eq!(body.files.len(), 2);
    }

    #[tokio::test]
    async fn region_without_body_is_absent() {
        let nav = detail_page(true);
        let regions = dom::read_regions(&nav).await.unwrap();
        let titles: Vec<_> = regions.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["공고일반", "자격정보", "개찰일정", "첨부파일", "공동수급", "참조"]
        );

        let orphan = &regions[4];
        assert!(orphan.body.is_none());
        assert_eq!(
            classify(&orphan.text, &orphan.shape),
            RegionKind::NonData(Skip::Absent)
        );
        let calendar = &regions[2];
        assert_eq!(
            classify(&calendar.text, &calendar.shape),
            RegionKind::NonData(Skip::Calendar)
        );
    }
}
