// Reply decoding
use crate::dto::{BrowseRoutesReply, LiveReply};
use quick_xml::de::from_str;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub const UPDATES_COMPLETE: &str = "UpdatesComplete";
pub const UPDATES_PENDING: &str = "UpdatesPending";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Empty payload")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFormat {
    #[default]
    Json,
    Xml,
}

impl ReplyFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ReplyFormat::Json => "application/json",
            ReplyFormat::Xml => "application/xml",
        }
    }

    // Looks at the first significant byte; a leading BOM is skipped
    pub fn detect(payload: &[u8]) -> Option<ReplyFormat> {
        let payload = payload.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(payload);
        match payload.iter().find(|byte| !byte.is_ascii_whitespace()) {
            Some(b'<') => Some(ReplyFormat::Xml),
            Some(_) => Some(ReplyFormat::Json),
            None => None,
        }
    }
}

impl std::str::FromStr for ReplyFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ReplyFormat::Json),
            "xml" => Ok(ReplyFormat::Xml),
            other => Err(format!("unknown reply format {}", other)),
        }
    }
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ParseError> {
    match ReplyFormat::detect(payload).ok_or(ParseError::Empty)? {
        ReplyFormat::Json => {
            serde_json::from_slice(payload).map_err(|e| ParseError::Json(e.to_string()))
        }
        ReplyFormat::Xml => {
            let text = std::str::from_utf8(payload).map_err(|e| ParseError::Xml(e.to_string()))?;
            from_str(text.trim_start_matches('\u{feff}')).map_err(|e| ParseError::Xml(e.to_string()))
        }
    }
}

pub fn parse_browse_reply(payload: &[u8]) -> Result<BrowseRoutesReply, ParseError> {
    decode(payload)
}

pub fn parse_live_reply(payload: &[u8]) -> Result<LiveReply, ParseError> {
    decode(payload)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct PollStatus {
    status: String,
}

// Only the session status, used while polling
pub fn poll_status(payload: &[u8]) -> Result<String, ParseError> {
    decode::<PollStatus>(payload).map(|reply| reply.status)
}
