//! Tag tokenizer.
//!
//! Every cell after the metadata header opens with a `**[label]**` marker.
//! The label is tokenized once into a closed [`TagLabel`] variant carrying the
//! parsed family and block index, so downstream checks never re-run patterns
//! against raw strings.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    /// Marker line: `**[label]**` with nothing else on the line.
    static ref MARKER_PATTERN: Regex = Regex::new(r"^\*\*\[([^\]]+)\]\*\*$").unwrap();

    /// Model comparison labels: response, validation report, human report.
    static ref MODEL_LABEL_PATTERN: Regex = Regex::new(
        r"^assistant_(nemo|qwen)_(\d+)(?:_(validation_report|human_report))?$"
    ).unwrap();
}

/// Model family used in comparison blocks. A transcript may use only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Nemo,
    Qwen,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Nemo => "nemo",
            Family::Qwen => "qwen",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "nemo" => Some(Family::Nemo),
            "qwen" => Some(Family::Qwen),
            _ => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label that does not belong to the tag grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized tag label: [{0}]")]
pub struct UnknownTag(pub String);

/// A tokenized cell tag.
///
/// Serializes as its bare label (`assistant_nemo_2_human_report`); `Display`
/// renders the bracketed form used in messages (`[assistant_nemo_2_human_report]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TagLabel {
    System,
    User,
    Thinking,
    Assistant,
    TurnMetadata,
    ConversationEnd,
    ModelResponse { family: Family, index: u32 },
    ValidationReport { family: Family, index: u32 },
    HumanReport { family: Family, index: u32 },
}

impl TagLabel {
    /// Tokenize a bare label (the text between the brackets).
    pub fn parse(label: &str) -> Result<Self, UnknownTag> {
        let tag = match label {
            "system" => TagLabel::System,
            "user" => TagLabel::User,
            "thinking" => TagLabel::Thinking,
            "assistant" => TagLabel::Assistant,
            "turn_metadata" => TagLabel::TurnMetadata,
            "conversation_end" => TagLabel::ConversationEnd,
            other => return Self::parse_model_label(other),
        };
        Ok(tag)
    }

    fn parse_model_label(label: &str) -> Result<Self, UnknownTag> {
        let unknown = || UnknownTag(label.to_string());
        let caps = MODEL_LABEL_PATTERN.captures(label).ok_or_else(unknown)?;

        let family = Family::parse(&caps[1]).ok_or_else(unknown)?;
        // Indices that overflow u32 are not part of the grammar
        let index: u32 = caps[2].parse().map_err(|_| unknown())?;

        Ok(match caps.get(3).map(|m| m.as_str()) {
            None => TagLabel::ModelResponse { family, index },
            Some("validation_report") => TagLabel::ValidationReport { family, index },
            Some(_) => TagLabel::HumanReport { family, index },
        })
    }

    /// The bare label, without brackets.
    pub fn label(&self) -> String {
        match self {
            TagLabel::System => "system".to_string(),
            TagLabel::User => "user".to_string(),
            TagLabel::Thinking => "thinking".to_string(),
            TagLabel::Assistant => "assistant".to_string(),
            TagLabel::TurnMetadata => "turn_metadata".to_string(),
            TagLabel::ConversationEnd => "conversation_end".to_string(),
            TagLabel::ModelResponse { family, index } => format!("assistant_{family}_{index}"),
            TagLabel::ValidationReport { family, index } => {
                format!("assistant_{family}_{index}_validation_report")
            }
            TagLabel::HumanReport { family, index } => {
                format!("assistant_{family}_{index}_human_report")
            }
        }
    }

    /// Family of a model comparison tag.
    pub fn family(&self) -> Option<Family> {
        match self {
            TagLabel::ModelResponse { family, .. }
            | TagLabel::ValidationReport { family, .. }
            | TagLabel::HumanReport { family, .. } => Some(*family),
            _ => None,
        }
    }

    /// Block index of a model comparison tag.
    pub fn index(&self) -> Option<u32> {
        match self {
            TagLabel::ModelResponse { index, .. }
            | TagLabel::ValidationReport { index, .. }
            | TagLabel::HumanReport { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Tags allowed in the main conversation area.
    pub fn is_conversation_tag(&self) -> bool {
        matches!(
            self,
            TagLabel::System | TagLabel::User | TagLabel::Thinking | TagLabel::Assistant
        )
    }

    /// Tags whose body must carry a fenced JSON payload.
    pub fn carries_json(&self) -> bool {
        matches!(
            self,
            TagLabel::TurnMetadata | TagLabel::ValidationReport { .. } | TagLabel::HumanReport { .. }
        )
    }
}

impl fmt::Display for TagLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label())
    }
}

impl TryFrom<String> for TagLabel {
    type Error = UnknownTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TagLabel::parse(&value)
    }
}

impl From<TagLabel> for String {
    fn from(tag: TagLabel) -> Self {
        tag.label()
    }
}

/// Extract the label from a `**[label]**` marker line.
///
/// The line is expected to be trimmed already.
pub fn parse_marker(line: &str) -> Option<&str> {
    MARKER_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_labels() {
        assert_eq!(TagLabel::parse("system"), Ok(TagLabel::System));
        assert_eq!(TagLabel::parse("user"), Ok(TagLabel::User));
        assert_eq!(TagLabel::parse("turn_metadata"), Ok(TagLabel::TurnMetadata));
        assert_eq!(TagLabel::parse("conversation_end"), Ok(TagLabel::ConversationEnd));
    }

    #[test]
    fn test_model_labels() {
        assert_eq!(
            TagLabel::parse("assistant_nemo_2"),
            Ok(TagLabel::ModelResponse { family: Family::Nemo, index: 2 })
        );
        assert_eq!(
            TagLabel::parse("assistant_qwen_11_validation_report"),
            Ok(TagLabel::ValidationReport { family: Family::Qwen, index: 11 })
        );
        assert_eq!(
            TagLabel::parse("assistant_nemo_3_human_report"),
            Ok(TagLabel::HumanReport { family: Family::Nemo, index: 3 })
        );
    }

    #[test]
    fn test_unknown_labels() {
        assert!(TagLabel::parse("Assistant").is_err());
        assert!(TagLabel::parse("assistant_llama_1").is_err());
        assert!(TagLabel::parse("assistant_nemo_x").is_err());
        assert!(TagLabel::parse("assistant_nemo_1_report").is_err());
        assert!(TagLabel::parse("assistant_nemo_99999999999").is_err());
    }

    #[test]
    fn test_label_round_trip_through_serde() {
        let tag = TagLabel::HumanReport { family: Family::Qwen, index: 4 };
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"assistant_qwen_4_human_report\"");
        let back: TagLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn test_display_is_bracketed() {
        assert_eq!(TagLabel::Thinking.to_string(), "[thinking]");
        assert_eq!(
            TagLabel::ModelResponse { family: Family::Nemo, index: 1 }.to_string(),
            "[assistant_nemo_1]"
        );
    }

    #[test]
    fn test_marker_line() {
        assert_eq!(parse_marker("**[user]**"), Some("user"));
        assert_eq!(parse_marker("**[assistant_nemo_1]**"), Some("assistant_nemo_1"));
        assert_eq!(parse_marker("[user]"), None);
        assert_eq!(parse_marker("**[user]** hello"), None);
        assert_eq!(parse_marker("**[]**"), None);
    }

    #[test]
    fn test_json_carriers() {
        assert!(TagLabel::TurnMetadata.carries_json());
        assert!(TagLabel::ValidationReport { family: Family::Nemo, index: 1 }.carries_json());
        assert!(!TagLabel::ModelResponse { family: Family::Nemo, index: 1 }.carries_json());
        assert!(!TagLabel::User.carries_json());
    }
}
