/// Structural facts about a section body, read before any parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionShape {
    pub present: bool,
    pub visible: bool,
    pub has_grid: bool,
    pub has_table: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    KeyValueTable,
    RepeatingGrid,
    NonData(Skip),
}

/// Why a region carries no record data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Absent,
    Hidden,
    Empty,
    Calendar,
    SearchForm,
    PlainText,
}

/// A calendar widget prints its weekday header; any full set marks one.
const CALENDAR_SIGNATURES: &[&[&str]] = &[&["Sunday", "Monday"], &["일요일", "월요일"]];

/// An embedded filter form shows a search button next to a reset button.
const SEARCH_FORM_SIGNATURES: &[&[&str]] = &[&["검색", "초기화"], &["search", "reset"]];

const ATTACHMENT_KEYWORDS: &[&str] = &["파일", "첨부", "attachment"];

/// Decide what a section body holds from its text and shape alone.
///
/// Calendar widgets and filter forms reuse the same table markup as data, so
/// they are recognized by content before structure is considered.
pub fn classify(text: &str, shape: &RegionShape) -> RegionKind {
    if !shape.present {
        return RegionKind::NonData(Skip::Absent);
    }
    if !shape.visible {
        return RegionKind::NonData(Skip::Hidden);
    }
    if text.trim().is_empty() {
        return RegionKind::NonData(Skip::Empty);
    }
    if has_signature(text, CALENDAR_SIGNATURES) {
        return RegionKind::NonData(Skip::Calendar);
    }
    if has_signature(&text.to_lowercase(), SEARCH_FORM_SIGNATURES) {
        return RegionKind::NonData(Skip::SearchForm);
    }
    if shape.has_grid {
        RegionKind::RepeatingGrid
    } else if shape.has_table {
        RegionKind::KeyValueTable
    } else {
        RegionKind::NonData(Skip::PlainText)
    }
}

/// Sections whose title names attachments feed the record's file list.
pub fn is_attachment_section(title: &str) -> bool {
    let lower = title.to_lowercase();
    ATTACHMENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_signature(text: &str, signatures: &[&[&str]]) -> bool {
    signatures
        .iter()
        .any(|tokens| tokens.iter().all(|t| text.contains(t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: RegionShape = RegionShape {
        present: true,
        visible: true,
        has_grid: false,
        has_table: true,
    };
    const GRID: RegionShape = RegionShape {
        present: true,
        visible: true,
        has_grid: true,
        has_table: true,
    };

    #[test]
    fn calendar_excluded_regardless_of_markup() {
        let text = "2024.03 Sunday Monday Tuesday Wednesday 1 2 3";
        assert_eq!(classify(text, &TABLE), RegionKind::NonData(Skip::Calendar));
        assert_eq!(classify(text, &GRID), RegionKind::NonData(Skip::Calendar));
        assert_eq!(
            classify("일요일 월요일 화요일", &TABLE),
            RegionKind::NonData(Skip::Calendar)
        );
    }

    #[test]
    fn single_weekday_is_not_a_calendar() {
        assert_eq!(classify("개찰일 Monday 10:00", &TABLE), RegionKind::KeyValueTable);
    }

    #[test]
    fn search_form_excluded() {
        assert_eq!(
            classify("업체명 검색 초기화", &GRID),
            RegionKind::NonData(Skip::SearchForm)
        );
        assert_eq!(
            classify("Name Search Reset", &TABLE),
            RegionKind::NonData(Skip::SearchForm)
        );
        assert_eq!(classify("검색어 안내", &TABLE), RegionKind::KeyValueTable);
    }

    #[test]
    fn grid_wins_over_table() {
        assert_eq!(classify("업체명 지분율", &GRID), RegionKind::RepeatingGrid);
        assert_eq!(classify("입찰방식 전자입찰", &TABLE), RegionKind::KeyValueTable);
    }

    #[test]
    fn plain_text_and_missing_regions_skipped() {
        let prose = RegionShape {
            present: true,
            visible: true,
            ..Default::default()
        };
        assert_eq!(classify("공고 안내문", &prose), RegionKind::NonData(Skip::PlainText));
        assert_eq!(
            classify("anything", &RegionShape::default()),
            RegionKind::NonData(Skip::Absent)
        );
        let hidden = RegionShape {
            visible: false,
            ..TABLE
        };
        assert_eq!(classify("입찰방식", &hidden), RegionKind::NonData(Skip::Hidden));
        assert_eq!(classify("  \n ", &TABLE), RegionKind::NonData(Skip::Empty));
    }

    #[test]
    fn attachment_titles() {
        assert!(is_attachment_section("첨부파일"));
        assert!(is_attachment_section("공고 파일"));
        assert!(is_attachment_section("Attachments"));
        assert!(!is_attachment_section("공고일반"));
    }
}
