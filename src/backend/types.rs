use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TokenizeRequest<'a> {
    pub text: &'a str,
}

/// `POST /tokenize-text` reply. `tokens` is the subset with clips, in
/// caption order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizeResponse {
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub tokens_all: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchVideosRequest<'a> {
    pub tokens: Vec<&'a str>,
}

/// `POST /batch-token-videos` reply; `null` or absent means no clip.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchVideosResponse {
    #[serde(default)]
    pub videos: HashMap<String, Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct ComposeSegmentRequest<'a> {
    pub text: &'a str,
    pub use_llm: bool,
}

/// `POST /reverse-translate-segment` reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeSegmentResponse {
    pub video_url: String,
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// `POST /infer-frame` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    #[serde(default)]
    pub detected_sign: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct ConfirmedWordsRequest<'a> {
    #[serde(rename = "confirmedWords")]
    pub confirmed_words: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct SentenceResponse {
    pub sentence: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_reply_tolerates_nulls() {
        let reply: BatchVideosResponse = serde_json::from_str(
            r#"{"videos": {"hello": "/token-video/hello", "ghost": null}}"#,
        )
        .unwrap();
        assert_eq!(reply.videos["hello"].as_deref(), Some("/token-video/hello"));
        assert_eq!(reply.videos["ghost"], None);
    }

    #[test]
    fn tokenize_reply_fields_are_optional() {
        let reply: TokenizeResponse = serde_json::from_str(r#"{"tokens": ["hi"]}"#).unwrap();
        assert_eq!(reply.tokens, vec!["hi"]);
        assert!(reply.missing.is_empty());
    }

    #[test]
    fn confirmed_words_use_camel_case_key() {
        let words = vec!["hello".to_string()];
        let body = serde_json::to_value(ConfirmedWordsRequest {
            confirmed_words: &words,
        })
        .unwrap();
        assert_eq!(body["confirmedWords"][0], "hello");
    }
}
