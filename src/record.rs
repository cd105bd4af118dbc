use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label → value pairs, in page order.
pub type Fields = IndexMap<String, String>;

/// Body of one labelled detail-view section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionBody {
    KeyValue(Fields),
    Grid(Vec<Fields>),
}

impl SectionBody {
    pub fn is_empty(&self) -> bool {
        match self {
            SectionBody::KeyValue(fields) => fields.is_empty(),
            SectionBody::Grid(rows) => rows.is_empty(),
        }
    }
}

/// What the extractor recovers from a detail view, before identity is stamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBody {
    pub sections: IndexMap<String, SectionBody>,
    pub files: Vec<Fields>,
}

/// One harvested announcement. Written once to the record log, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub title: String,
    /// RFC 3339, local time of extraction.
    pub collected_at: String,
    #[serde(default)]
    pub sections: IndexMap<String, SectionBody>,
    #[serde(default)]
    pub files: Vec<Fields>,
}

impl RawRecord {
    pub fn new(id: String, title: String, collected_at: String, body: RecordBody) -> Self {
        RawRecord {
            id,
            title,
            collected_at,
            sections: body.sections,
            files: body.files,
        }
    }

    /// A record without an identifier carries nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// Cheap projection of a listing row, read without opening the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Position on the current page; detail views are opened by position.
    pub index: usize,
    pub id: String,
    pub title: String,
    pub posted_on: Option<NaiveDate>,
}
