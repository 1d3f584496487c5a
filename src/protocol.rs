//! Wire formats shared with the scoring backend.

use std::collections::BTreeMap;

use feedwarden_core_types::{ItemId, ScoreData};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Body of `POST /api/videos/evaluate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub video_id: ItemId,
    pub categories: Vec<String>,
    pub custom_prompts: Vec<String>,
}

/// Messages delivered on the push channel.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum PushEnvelope {
    #[serde(rename = "videoScore")]
    VideoScore(ScoreMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScoreMessage {
    #[serde(rename = "videoId")]
    pub item: ItemId,
    pub score: f64,
    #[serde(default)]
    pub categories: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub content_summary: Option<String>,
    #[serde(default)]
    pub evaluation_summary: Option<String>,
}

impl ScoreMessage {
    pub fn into_parts(self) -> (ItemId, ScoreData) {
        let data = ScoreData {
            score: self.score,
            categories: self.categories.unwrap_or_default(),
            content_summary: self.content_summary.filter(|s| !s.is_empty()),
            evaluation_summary: self.evaluation_summary.filter(|s| !s.is_empty()),
        };
        (self.item, data)
    }
}

pub fn parse_push(text: &str) -> Result<PushEnvelope, OrchestratorError> {
    serde_json::from_str(text).map_err(|err| OrchestratorError::Parse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_message_parses_backend_payload() {
        let raw = r#"{
            "type": "videoScore",
            "videoId": "abc123",
            "score": 2.5,
            "categories": {"clarity": 4.0, "hatred": 1.25},
            "evaluation_summary": "low effort",
            "content_summary": "a reaction video"
        }"#;
        let PushEnvelope::VideoScore(message) = parse_push(raw).unwrap() else {
            panic!("expected a score message");
        };
        let (item, data) = message.into_parts();
        assert_eq!(item.as_str(), "abc123");
        assert_eq!(data.score, 2.5);
        assert_eq!(data.categories.get("hatred"), Some(&1.25));
        assert_eq!(data.content_summary.as_deref(), Some("a reaction video"));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let envelope = parse_push(r#"{"type": "heartbeat", "at": 1}"#).unwrap();
        assert_eq!(envelope, PushEnvelope::Unknown);
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        assert!(matches!(
            parse_push("not json"),
            Err(OrchestratorError::Parse(_))
        ));
        assert!(matches!(
            parse_push(r#"{"videoId": "x", "score": 1}"#),
            Err(OrchestratorError::Parse(_))
        ));
        assert!(matches!(
            parse_push(r#"{"type": "videoScore", "videoId": "x"}"#),
            Err(OrchestratorError::Parse(_))
        ));
    }

    #[test]
    fn missing_optional_fields_default() {
        let PushEnvelope::VideoScore(message) =
            parse_push(r#"{"type": "videoScore", "videoId": "x", "score": 7, "categories": null}"#)
                .unwrap()
        else {
            panic!("expected a score message");
        };
        let (_, data) = message.into_parts();
        assert!(data.categories.is_empty());
        assert!(!data.has_summary());
    }

    #[test]
    fn evaluate_request_uses_camel_case() {
        let request = EvaluateRequest {
            video_id: ItemId::from("abc123"),
            categories: vec!["clarity".into()],
            custom_prompts: vec![],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"videoId": "abc123", "categories": ["clarity"], "customPrompts": []})
        );
    }
}
