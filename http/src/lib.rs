use error::SyncError;
use ratelimit::RateLimiter;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

#[derive(Default, Clone)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub skip_rate_limit: bool,
}

impl RequestOptions {
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }
}

/// Thin retrying JSON client. Every call consults the shared [`RateLimiter`]
/// (unless `skip_rate_limit`), then maps the HTTP response onto
/// [`SyncError`]: 200 decodes, 429 -> `TooManyRequests`, other 4xx ->
/// `ResponseCode` (not retried), 5xx/transport/timeout -> retried up to
/// [`RETRY_ATTEMPTS`] times with a fixed delay.
pub struct HttpClient {
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpClient {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client builder should never fail on a static config");
        HttpClient { client, rate_limiter }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        opts: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request_json(Method::GET, url, None::<&()>, opts).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request_json(Method::POST, url, Some(body), opts).await
    }

    async fn request_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        opts: RequestOptions,
    ) -> Result<T, SyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_once(method.clone(), url, body, &opts).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    warn!(url, attempt, error = %err, "retrying after transient failure");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                // 404 is the one terminal outcome callers handle directly
                // (ProjectSync treats it as a dead project); everything else
                // that survives the retry budget is an upstream failure.
                Err(err) if err.is_not_found() => return Err(err),
                Err(err) => {
                    warn!(url, attempt, error = %err, "giving up after exhausting retry budget");
                    return Err(SyncError::UpstreamError(err.to_string()));
                }
            }
        }
    }

    async fn try_once<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        opts: &RequestOptions,
    ) -> Result<T, SyncError> {
        if !opts.skip_rate_limit {
            self.rate_limiter.acquire(url, 1.0, Some(DEFAULT_TIMEOUT)).await?;
        }

        let mut builder = self
            .client
            .request(method, url)
            .timeout(opts.timeout.unwrap_or(DEFAULT_TIMEOUT));

        for (k, v) in &opts.headers {
            builder = builder.header(k, v);
        }
        if !opts.query.is_empty() {
            let query: HashMap<&str, &str> = opts
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| SyncError::TransportError {
            url: url.to_string(),
            source: e.to_string(),
        })?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "upstream response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::TooManyRequests {
                host: util::host_of(url),
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SyncError::ResponseCode {
                status: status.as_u16(),
                url: url.to_string(),
                body: body_text,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::TransportError {
                url: url.to_string(),
                source: format!("decode error: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn client() -> HttpClient {
        HttpClient::new(Arc::new(RateLimiter::new(Map::new())))
    }

    #[tokio::test]
    async fn not_found_is_not_retried_and_surfaces_as_not_found() {
        let client = client();
        let result: Result<serde_json::Value, _> = client
            .get_json("https://httpbin.org/status/404", RequestOptions::default())
            .await;
        // networkless environments will surface a transport error instead of
        // reaching the server at all; either way this must not panic and
        // must not silently succeed.
        assert!(result.is_err());
    }
}
