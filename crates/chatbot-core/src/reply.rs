//! Shapes of the `/api/chat` response body.
//!
//! The server answers either with a flat segment array or, when configured for
//! older clients, with a `{ text_content, logo_content }` object.  Both are
//! decoded strictly: anything else is an [`ReplyError::UnrecognizedResponseShape`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::render::compose;
use crate::segment::{Segment, Segmentation, segment};

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("unrecognized response shape: {0}")]
    UnrecognizedResponseShape(String),
}

/// Pre-segmentation response format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LegacyReply {
    pub text_content: String,
    #[serde(default)]
    pub logo_content: Option<String>,
}

impl From<Segmentation> for LegacyReply {
    fn from(split: Segmentation) -> Self {
        let text_content = split
            .segments
            .iter()
            .map(|s| if s.is_math() { format!("${}$", s.content) } else { s.content.clone() })
            .collect::<Vec<_>>()
            .join("\n");
        Self { text_content, logo_content: split.logo }
    }
}

/// The `response` member of a chat reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ReplyBody {
    Segments(Vec<Segment>),
    Legacy(LegacyReply),
    Text(String),
}

impl ReplyBody {
    pub fn decode(value: Value) -> Result<Self, ReplyError> {
        serde_json::from_value(value.clone()).map_err(|_| {
            let mut shown = value.to_string();
            if shown.len() > 120 {
                let mut cut = 120;
                while !shown.is_char_boundary(cut) {
                    cut -= 1;
                }
                shown.truncate(cut);
                shown.push('…');
            }
            ReplyError::UnrecognizedResponseShape(shown)
        })
    }

    /// The string stored as the bot message content.
    pub fn into_content(self) -> String {
        match self {
            Self::Segments(segments) => compose(&segments),
            Self::Legacy(LegacyReply { text_content, logo_content }) => {
                let body = compose(&segment(&text_content));
                match logo_content.map(|l| l.trim().to_owned()).filter(|l| !l.is_empty()) {
                    Some(logo) if body.is_empty() => logo,
                    Some(logo) => format!("{logo}\n\n{body}"),
                    None => body,
                }
            }
            Self::Text(text) => text.trim().to_owned(),
        }
    }
}

/// Envelope returned by `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub success: bool,
    pub input: String,
    pub response: ReplyBody,
}

impl ChatResponse {
    pub fn decode(value: Value) -> Result<Self, ReplyError> {
        let Value::Object(mut map) = value else {
            return Err(ReplyError::UnrecognizedResponseShape("expected an object".into()));
        };
        let success = map.get("success").and_then(Value::as_bool).unwrap_or(false);
        let input = map
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let response = map
            .remove("response")
            .ok_or_else(|| ReplyError::UnrecognizedResponseShape("missing `response`".into()))?;
        Ok(Self { success, input, response: ReplyBody::decode(response)? })
    }
}
