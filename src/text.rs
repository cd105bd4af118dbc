use std::fmt;
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\u{a0}]+").unwrap());
static DATE_TIME_GAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}[/.\-]\d{2}[/.\-]\d{2})(\d{2}:\d{2})").unwrap()
});
static LISTING_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})/(\d{2})/(\d{2})").unwrap());

/// Units the portal prints alone when the amount field is blank.
const CURRENCY_UNITS: &[&str] = &["원", "천원", "백만원", "KRW"];

const YMD: &str = "%Y%m%d";

/// Normalize a scraped string: collapse whitespace runs (NBSP included) to one
/// space, trim, split a glued `date+time` pair, and turn a bare currency unit
/// into an explicit zero amount.
pub fn clean_text(raw: &str) -> String {
    let collapsed = WS_RE.replace_all(raw, " ");
    let trimmed = collapsed.trim();
    if CURRENCY_UNITS.contains(&trimmed) {
        return format!("0{}", trimmed);
    }
    DATE_TIME_GAP_RE.replace_all(trimmed, "$1 $2").into_owned()
}

/// First `YYYY/MM/DD` date printed anywhere in a listing row.
pub fn listing_date(row_text: &str) -> Option<NaiveDate> {
    let caps = LISTING_DATE_RE.captures(row_text)?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

pub fn parse_ymd(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), YMD)
}

pub fn format_ymd(date: NaiveDate) -> String {
    date.format(YMD).to_string()
}

/// Inclusive posting-date range submitted to the search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Orders the bounds so `start <= end`.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            DateWindow { start: a, end: b }
        } else {
            DateWindow { start: b, end: a }
        }
    }

    /// Yesterday through today, used by the recurring modes.
    pub fn incremental(today: NaiveDate) -> Self {
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        DateWindow::new(yesterday, today)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", format_ymd(self.start), format_ymd(self.end))
    }
}
