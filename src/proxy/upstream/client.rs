// Upstream client
// reqwest wrapper for the Cloud Code v1internal API with endpoint fallback

use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use tokio::time::Duration;

use crate::models::config::TimeoutConfig;

const DEFAULT_USER_AGENT: &str = "antigravity-gateway/1.0";

// Cloud Code v1internal endpoints (fallback order: Sandbox → Daily → Prod)
const V1_INTERNAL_BASE_URL_PROD: &str = "https://cloudcode-pa.googleapis.com/v1internal";
const V1_INTERNAL_BASE_URL_DAILY: &str = "https://daily-cloudcode-pa.googleapis.com/v1internal";
const V1_INTERNAL_BASE_URL_SANDBOX: &str =
    "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal";

const V1_INTERNAL_BASE_URL_FALLBACKS: [&str; 3] = [
    V1_INTERNAL_BASE_URL_SANDBOX,
    V1_INTERNAL_BASE_URL_DAILY,
    V1_INTERNAL_BASE_URL_PROD,
];

/// Mask an email for logs
pub fn mask_email(email: &str) -> String {
    if let Some(at_pos) = email.find('@') {
        let local = &email[..at_pos];
        let domain = &email[at_pos + 1..];
        let local_prefix: String = local.chars().take(3).collect();
        let domain_prefix: String = domain.chars().take(2).collect();
        format!("{}***@{}***", local_prefix, domain_prefix)
    } else {
        let prefix: String = email.chars().take(5).collect();
        format!("{}***", prefix)
    }
}

/// Upstream failure before any usable response arrived
#[derive(Debug)]
pub struct TransportError {
    pub message: String,
    pub category: &'static str,
}

pub struct UpstreamClient {
    client: Client,
    base_urls: Vec<String>,
    request_timeout: Duration,
    streaming_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeouts: &TimeoutConfig, base_url: Option<&str>) -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connection))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        let base_urls = match base_url {
            Some(url) => vec![url.trim_end_matches('/').to_string()],
            None => V1_INTERNAL_BASE_URL_FALLBACKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Ok(Self {
            client,
            base_urls,
            request_timeout: Duration::from_secs(timeouts.request),
            streaming_timeout: Duration::from_secs(timeouts.streaming),
        })
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Build v1internal URL
    fn build_url(base_url: &str, method: &str, query_string: Option<&str>) -> String {
        if let Some(qs) = query_string {
            format!("{}:{}?{}", base_url, method, qs)
        } else {
            format!("{}:{}", base_url, method)
        }
    }

    /// Determine if we should try next endpoint
    fn should_try_next_endpoint(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::NOT_FOUND
            || status.is_server_error()
    }

    /// Send a generate call, streaming (`streamGenerateContent?alt=sse`) or not.
    ///
    /// Returns the first successful response, or the last non-success one when
    /// no endpoint is left to try. Only transport failures on every endpoint
    /// produce `Err`.
    pub async fn generate(
        &self,
        access_token: &str,
        body: &Value,
        stream: bool,
    ) -> Result<Response, TransportError> {
        let (method, query, timeout) = if stream {
            ("streamGenerateContent", Some("alt=sse"), self.streaming_timeout)
        } else {
            ("generateContent", None, self.request_timeout)
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", access_token)).map_err(|e| {
                TransportError {
                    message: format!("Invalid access token header: {}", e),
                    category: "invalid_token",
                }
            })?,
        );

        let mut last_err: Option<TransportError> = None;

        for (idx, base_url) in self.base_urls.iter().enumerate() {
            let url = Self::build_url(base_url, method, query);
            let has_next = idx + 1 < self.base_urls.len();

            let response = self
                .client
                .post(&url)
                .headers(headers.clone())
                .timeout(timeout)
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if idx > 0 {
                            tracing::info!(
                                "✓ Upstream fallback succeeded | Endpoint: {} | Status: {}",
                                base_url,
                                status
                            );
                        }
                        return Ok(resp);
                    }

                    if has_next && Self::should_try_next_endpoint(status) {
                        tracing::warn!(
                            "Upstream endpoint returned {} at {} (method={}), trying next",
                            status,
                            base_url,
                            method
                        );
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let category = crate::proxy::common::error_classifier::classify_network_error(&e);
                    tracing::debug!("HTTP request failed at {} ({}): {}", base_url, category, e);
                    last_err = Some(TransportError {
                        message: crate::proxy::common::common_utils::describe_error(&e),
                        category,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(TransportError {
            message: "All endpoints failed".to_string(),
            category: "network_error",
        }))
    }
}
