use crate::domain::model::{HttpMethod, RawResponse};
use crate::domain::ports::Transport;
use crate::utils::error::{Result, SchedulerError};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

/// 對排程 API 的 HTTP 傳輸
///
/// 遠端會拒絕缺少瀏覽器標頭的請求，因此每個請求都帶固定標頭。
/// `header_timeout` 只限制等待回應標頭的時間；讀取內容預設不限時，
/// 可用 `body_timeout` 另外限制。
pub struct HttpTransport {
    client: Client,
    base_url: String,
    header_timeout: Duration,
    body_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        origin: &str,
        header_timeout: Duration,
        body_timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers(origin)?)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            header_timeout,
            body_timeout,
        })
    }
}

fn browser_headers(origin: &str) -> Result<HeaderMap> {
    let origin = origin.trim_end_matches('/');
    let invalid = |e: header::InvalidHeaderValue| SchedulerError::InvalidConfigValueError {
        field: "app.booking_link_base".to_string(),
        value: origin.to_string(),
        reason: format!("Not usable as a header value: {}", e),
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::ORIGIN, HeaderValue::from_str(origin).map_err(invalid)?);
    headers.insert(
        header::REFERER,
        HeaderValue::from_str(&format!("{}/", origin)).map_err(invalid)?,
    );
    Ok(headers)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = match method {
            HttpMethod::Post => self.client.post(&url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("📡 {:?} {}", method, url);

        let response = tokio::time::timeout(self.header_timeout, request.send())
            .await
            .map_err(|_| SchedulerError::HeaderTimeout {
                path: path.to_string(),
                timeout: self.header_timeout,
            })??;

        let status = response.status().as_u16();
        let body = match self.body_timeout {
            Some(limit) => tokio::time::timeout(limit, response.text())
                .await
                .map_err(|_| SchedulerError::BodyTimeout {
                    path: path.to_string(),
                    timeout: limit,
                })??,
            None => response.text().await?,
        };

        tracing::debug!("📡 {} responded with status {}", path, status);
        Ok(RawResponse { status, body })
    }
}
