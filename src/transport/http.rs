use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::app::{ApiErrorKind, Result};
use crate::config::ApiConfig;
use crate::transport::{ApiRequest, Method, Transport};

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    bearer: Option<HeaderValue>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("reelsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // A trailing slash keeps `join` from dropping the version segment.
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let bearer = match config.bearer_token.as_deref() {
            Some(token) if !token.is_empty() => Some(
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| crate::app::ReelError::Config(format!("bearer token: {}", e)))?,
            ),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            bearer,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> std::result::Result<Url, ApiErrorKind> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|_| ApiErrorKind::Unknown)?;

        if self.api_key.is_some() || !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            if let Some(ref key) = self.api_key {
                pairs.append_pair("api_key", key);
            }
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }

        Ok(url)
    }

    async fn send_once(&self, request: &ApiRequest) -> std::result::Result<Value, ApiErrorKind> {
        let url = self.url_for(request)?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(ref bearer) = self.bearer {
            builder = builder.header(AUTHORIZATION, bearer.clone());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let bytes = response.bytes().await.map_err(classify_reqwest)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!("Undecodable body from {}: {}", request.path, e);
            ApiErrorKind::Unknown
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<Value, ApiErrorKind> {
        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(value) => return Ok(value),
                Err(kind) if kind.is_retriable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        "{:?} {} failed with {}, retry {}/{}",
                        request.method,
                        request.path,
                        kind,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(kind) => return Err(kind),
            }
        }
    }
}

pub fn classify_status(status: StatusCode) -> ApiErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiErrorKind::Unauthorized,
        StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiErrorKind::Timeout,
        _ => ApiErrorKind::Unknown,
    }
}

fn classify_reqwest(err: reqwest::Error) -> ApiErrorKind {
    if err.is_timeout() {
        ApiErrorKind::Timeout
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else if err.is_connect() || err.is_request() {
        ApiErrorKind::NetworkFailure
    } else if err.is_decode() {
        ApiErrorKind::Unknown
    } else {
        ApiErrorKind::NetworkFailure
    }
}
