//! Upload status and assistant modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which document source is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    #[default]
    None,
    Preloaded,
    Xbrl,
    Json,
}

/// Current upload state; overwritten by each successful upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub kind: UploadKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl UploadStatus {
    pub fn new(kind: UploadKind, filename: Option<String>) -> Self {
        Self { kind, filename }
    }

    /// Human-readable summary for status lines
    pub fn describe(&self) -> String {
        match (self.kind, self.filename.as_deref()) {
            (UploadKind::None, _) => "No filing loaded".to_string(),
            (UploadKind::Preloaded, _) => "Using preloaded sample filing".to_string(),
            (UploadKind::Xbrl, Some(name)) => format!("XBRL filing: {}", name),
            (UploadKind::Xbrl, None) => "XBRL filing".to_string(),
            (UploadKind::Json, Some(name)) => format!("JSON filing: {}", name),
            (UploadKind::Json, None) => "JSON filing".to_string(),
        }
    }
}

/// Kind of file being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Raw XBRL archive, converted by the backend
    Xbrl,
    /// Already-converted JSON document
    Json,
}

impl FileKind {
    /// Guess from the file extension; anything that is not `.json` is XBRL
    pub fn from_file_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".json") {
            FileKind::Json
        } else {
            FileKind::Xbrl
        }
    }
}

/// Assistant modes accepted by `POST /switch_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    Preloaded,
    UserJson,
    ConvertedXbrl,
}

impl AssistantMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantMode::Preloaded => "preloaded",
            AssistantMode::UserJson => "user_json",
            AssistantMode::ConvertedXbrl => "converted_xbrl",
        }
    }
}

impl fmt::Display for AssistantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssistantMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preloaded" => Ok(AssistantMode::Preloaded),
            "user_json" => Ok(AssistantMode::UserJson),
            "converted_xbrl" => Ok(AssistantMode::ConvertedXbrl),
            other => Err(format!(
                "Unknown mode '{}'. Valid: preloaded, user_json, converted_xbrl",
                other
            )),
        }
    }
}
