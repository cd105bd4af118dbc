use crate::record::Fields;
use crate::text::clean_text;

/// Grid columns that hold row numbers, checkboxes, or preview buttons.
const NON_DATA_COLUMNS: &[&str] = &["No", "NO", "선택", "미리보기"];

/// Placeholder row text of an empty grid.
const NO_DATA_MARKERS: &[&str] = &["데이터가 없음", "데이터가 없습니다", "No data"];

/// Placeholder option of an untouched dropdown.
const SELECT_PLACEHOLDERS: &[&str] = &["선택", "please select"];

/// Raw contents of one value cell, as read from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSnapshot {
    /// Text of the chosen option, when the cell holds a dropdown.
    pub selected: Option<String>,
    /// `value` of the first editable or readonly input.
    pub input: Option<String>,
    pub text: String,
}

impl CellSnapshot {
    pub fn text(s: &str) -> Self {
        CellSnapshot {
            text: s.to_string(),
            ..Default::default()
        }
    }
}

/// Label cells and value cells of one key-value table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRowSnapshot {
    pub labels: Vec<String>,
    pub values: Vec<CellSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridRowSnapshot {
    pub text: String,
    pub cells: Vec<CellSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<GridRowSnapshot>,
}

/// Preferred value of a cell: chosen option, else input value, else visible text.
pub fn cell_value(cell: &CellSnapshot) -> String {
    if let Some(selected) = cell.selected.as_deref().map(clean_text) {
        let lower = selected.to_lowercase();
        if !selected.is_empty() && !SELECT_PLACEHOLDERS.iter().any(|p| lower.contains(p)) {
            return selected;
        }
    }
    if let Some(input) = cell.input.as_deref().map(clean_text) {
        if !input.is_empty() {
            return input;
        }
    }
    clean_text(&cell.text)
}

/// Pair label cells with value cells by position, row by row. The shorter side
/// of a row decides how many pairs it yields.
pub fn parse_key_value(rows: &[TableRowSnapshot]) -> Fields {
    let mut fields = Fields::new();
    for row in rows {
        for (label, cell) in row.labels.iter().zip(&row.values) {
            let key = clean_text(label);
            if key.is_empty() {
                continue;
            }
            fields.insert(key, cell_value(cell));
        }
    }
    fields
}

/// Zip each body row against the header labels, dropping bookkeeping columns,
/// placeholder rows, and rows without a single non-empty value.
pub fn parse_grid(grid: &GridSnapshot) -> Vec<Fields> {
    let headers: Vec<String> = grid.headers.iter().map(|h| clean_text(h)).collect();
    if headers.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for row in &grid.rows {
        if is_placeholder_row(row) {
            continue;
        }
        let mut fields = Fields::new();
        let mut has_data = false;
        for (key, cell) in headers.iter().zip(&row.cells) {
            if key.is_empty() || NON_DATA_COLUMNS.contains(&key.as_str()) {
                continue;
            }
            let value = cell_value(cell);
            has_data |= !value.is_empty();
            fields.insert(key.clone(), value);
        }
        if has_data {
            out.push(fields);
        }
    }
    out
}

/// An empty grid renders one spanning cell whose whole text is the marker,
/// sometimes with a lead-in ("조회된 데이터가 없습니다.").
fn is_placeholder_row(row: &GridRowSnapshot) -> bool {
    let filled = row
        .cells
        .iter()
        .filter(|c| !clean_text(&c.text).is_empty())
        .count();
    if filled > 1 {
        return false;
    }
    let text = clean_text(&row.text);
    let text = text.trim_end_matches(['.', '!']).trim_end();
    NO_DATA_MARKERS.iter().any(|m| text.ends_with(m))
}
