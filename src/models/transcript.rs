use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Seller segment the call was placed for
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CustomerType {
    Catalog,
    TsCatalog,
    Star,
    Leader,
    /// Any segment code not known ahead of time, kept verbatim
    Other(String),
}

impl CustomerType {
    pub fn as_str(&self) -> &str {
        match self {
            CustomerType::Catalog => "CATALOG",
            CustomerType::TsCatalog => "TSCATALOG",
            CustomerType::Star => "STAR",
            CustomerType::Leader => "LEADER",
            CustomerType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for CustomerType {
    fn from(value: String) -> Self {
        match value.trim().to_uppercase().as_str() {
            "CATALOG" => CustomerType::Catalog,
            "TSCATALOG" => CustomerType::TsCatalog,
            "STAR" => CustomerType::Star,
            "LEADER" => CustomerType::Leader,
            _ => CustomerType::Other(value.trim().to_string()),
        }
    }
}

impl From<CustomerType> for String {
    fn from(value: CustomerType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for CustomerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call metadata carried alongside the transcript text and copied onto every
/// insight record produced for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Seller global identifier (GLID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_type: Option<CustomerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_date: Option<NaiveDate>,
}

/// One translated call recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Unique call identifier
    pub call_id: String,
    #[serde(flatten)]
    pub metadata: CallMetadata,
    /// Full transcript text, possibly speaker-tagged
    pub text: String,
}

impl Transcript {
    pub fn new(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            metadata: CallMetadata::default(),
            text: text.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the transcript carries any text worth sending to the model
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Parse the date formats seen in call exports
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, RFC 3339 timestamps,
/// `DD-MM-YYYY` and `DD/MM/YYYY`.
pub fn parse_call_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
