use std::{collections::HashMap, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT},
    multipart, Client, Response, Url,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::queue::Token;

use super::{
    locator_from, parse_base_url,
    types::{
        BatchVideosRequest, BatchVideosResponse, ComposeSegmentRequest, ComposeSegmentResponse,
        ConfirmedWordsRequest, FrameDetection, SentenceResponse, TokenizeRequest,
        TokenizeResponse,
    },
    RecognitionBackend, TokenBackend,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const INFER_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// JSON-over-HTTP client for the sign backend.
#[derive(Clone)]
pub struct HttpBackend {
    base: Url,
    client: Client,
    /// No default content type; multipart bodies set their own.
    upload: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("signlink/0.1"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        let upload = Client::builder()
            .default_headers(HeaderMap::from_iter([(
                USER_AGENT,
                HeaderValue::from_static("signlink/0.1"),
            )]))
            .timeout(INFER_FRAME_TIMEOUT)
            .build()
            .context("failed to build upload client")?;

        Ok(Self {
            base: parse_base_url(base_url)?,
            client,
            upload,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        locator_from(&self.base, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        log_debug!("POST {}", url);

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
    let status = response.status();
    let url = response.url().clone();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "(no body)".to_string());
        bail!("{url} returned {status}: {body}");
    }
    response
        .json::<R>()
        .await
        .with_context(|| format!("invalid JSON from {url}"))
}

#[async_trait]
impl TokenBackend for HttpBackend {
    fn base_url(&self) -> &Url {
        &self.base
    }

    async fn tokenize(&self, text: &str) -> Result<TokenizeResponse> {
        self.post_json("/tokenize-text", &TokenizeRequest { text })
            .await
    }

    async fn batch_clip_locators(&self, tokens: &[Token]) -> Result<HashMap<Token, Url>> {
        let request = BatchVideosRequest {
            tokens: tokens.iter().map(Token::as_str).collect(),
        };
        let reply: BatchVideosResponse = self.post_json("/batch-token-videos", &request).await?;

        let mut resolved = HashMap::new();
        for (key, locator) in reply.videos {
            let (Some(token), Some(locator)) = (Token::normalize(&key), locator) else {
                continue;
            };
            match locator_from(&self.base, &locator) {
                Ok(url) => {
                    resolved.insert(token, url);
                }
                Err(err) => log_warn!("dropping locator for '{}': {err:#}", token),
            }
        }
        Ok(resolved)
    }

    async fn compose_segment(&self, text: &str, use_llm: bool) -> Result<ComposeSegmentResponse> {
        self.post_json(
            "/reverse-translate-segment",
            &ComposeSegmentRequest { text, use_llm },
        )
        .await
    }
}

#[async_trait]
impl RecognitionBackend for HttpBackend {
    async fn infer_frame(&self, jpeg: Vec<u8>) -> Result<FrameDetection> {
        let part = multipart::Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|err| anyhow!("invalid frame mime: {err}"))?;
        let form = multipart::Form::new().part("frame", part);
        let url = self.endpoint("/infer-frame")?;

        let response = self
            .upload
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        decode(response).await
    }

    async fn sentence_from_words(&self, words: &[String]) -> Result<String> {
        let reply: SentenceResponse = self
            .post_json(
                "/process-confirmed-words",
                &ConfirmedWordsRequest {
                    confirmed_words: words,
                },
            )
            .await?;
        Ok(reply.sentence)
    }
}
