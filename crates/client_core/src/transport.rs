//! HTTP plumbing shared by every endpoint: base url, API key header, status
//! and body handling.

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    config::ClientSettings,
    error::{ClientError, ClientResult},
};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    base_url: Url,
}

impl Transport {
    pub fn new(settings: &ClientSettings) -> ClientResult<Self> {
        let base_url = Url::parse(&settings.api_url)
            .map_err(|err| ClientError::Parse(format!("invalid api url {}: {err}", settings.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Parse(format!(
                "api url cannot carry paths: {}",
                settings.api_url
            )));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.api_key)
            .map_err(|_| ClientError::validation("api key contains invalid header characters"))?;
        headers.insert(API_KEY_HEADER, key);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `{base}/{segments...}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Parse(format!("api url cannot carry paths: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments)?;
        self.send(self.http.get(url)).await
    }

    pub async fn get_with_query<T, Q>(&self, segments: &[&str], query: &Q) -> ClientResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        self.send(self.http.get(url).query(query)).await
    }

    pub async fn post<T, B>(&self, segments: &[&str], body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        self.send(self.http.post(url).json(body)).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments)?;
        self.send(self.http.post(url)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments)?;
        self.send(self.http.delete(url)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("transport: request failed status={} body_len={}", status.as_u16(), body.len());
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }
}
