//! Remote collaborators: tokenization, clip resolution, segment composition
//! and sign recognition, all reached over HTTP+JSON.

pub mod http;
pub mod static_backend;
pub mod types;

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;

use crate::queue::Token;

pub use http::HttpBackend;
pub use static_backend::StaticBackend;
pub use types::{ComposeSegmentResponse, FrameDetection, TokenizeResponse};

#[async_trait]
pub trait TokenBackend: Send + Sync {
    fn base_url(&self) -> &Url;

    /// Caption or segment text to gloss tokens.
    async fn tokenize(&self, text: &str) -> Result<TokenizeResponse>;

    /// Clip locators for many tokens at once. Tokens missing from the map
    /// have no clip.
    async fn batch_clip_locators(&self, tokens: &[Token]) -> Result<HashMap<Token, Url>>;

    /// One composed clip for a whole segment, plus the tokens it used.
    async fn compose_segment(&self, text: &str, use_llm: bool) -> Result<ComposeSegmentResponse>;

    /// Per-token fallback locator: `{base}/token-video/{token}`.
    fn token_clip_url(&self, token: &Token) -> Result<Url> {
        let mut url = self.base_url().clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url {} cannot carry a path", self.base_url()))?
            .pop_if_empty()
            .push("token-video")
            .push(token.as_str());
        Ok(url)
    }
}

#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn infer_frame(&self, jpeg: Vec<u8>) -> Result<FrameDetection>;

    /// Confirmed gloss words to an English sentence.
    async fn sentence_from_words(&self, words: &[String]) -> Result<String>;
}

/// Turns a locator returned by the backend into an absolute URL.
///
/// Relative locators (`/token-video/hello`) are appended to the base URL,
/// keeping any path prefix the base carries.
pub fn locator_from(base: &Url, raw: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(raw) {
        return Ok(absolute);
    }
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        raw.trim_start_matches('/')
    );
    Url::parse(&joined).with_context(|| format!("invalid clip locator '{raw}'"))
}

/// Parses and normalizes a configured backend URL.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).with_context(|| format!("invalid backend url '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_locators_keep_base_prefix() {
        let base = parse_base_url("https://example.test/api/").unwrap();
        let url = locator_from(&base, "/token-video/hello").unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/token-video/hello");
    }

    #[test]
    fn absolute_locators_pass_through() {
        let base = parse_base_url("https://example.test").unwrap();
        let url = locator_from(&base, "https://cdn.test/clip.mp4").unwrap();
        assert_eq!(url.as_str(), "https://cdn.test/clip.mp4");
    }

    #[test]
    fn per_token_url_is_percent_encoded() {
        let backend = StaticBackend::new("https://example.test/", ["thank you"]).unwrap();
        let token = Token::normalize("thank you").unwrap();
        let url = backend.token_clip_url(&token).unwrap();
        assert_eq!(url.as_str(), "https://example.test/token-video/thank%20you");
    }
}
