use std::{
    sync::Once,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client, Url,
};
use thiserror::Error;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{config, declare::ContentKind, logging, util::text};

pub mod element;
pub mod table;
pub mod user_agent;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest 使用 rustls-no-provider，建立 client 前需要先安裝 ring
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// 抓取失敗的原因。除了 `Exhausted` 之外都屬於可重試的軟性失敗
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned {content_type:?} where {expected} was expected; head: {head}")]
    UnexpectedContent {
        url: String,
        expected: ContentKind,
        content_type: String,
        head: String,
    },
    #[error("{url} returned an empty or truncated body")]
    EmptyBody { url: String },
    #[error("gave up on {url} after {attempts} attempts; last error: {last}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: String,
    },
}

/// 抓取網頁或 CSV 的介面，流程中以此抽象，方便測試時替換
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, kind: ContentKind) -> Result<String, FetchError>;
}

/// 重試策略：最多嘗試次數、指數退避與隨機抖動
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(http: &config::Http) -> Self {
        RetryPolicy {
            max_attempts: http.max_attempts.max(1),
            base_delay: Duration::from_millis(http.backoff_base_ms),
            max_delay: Duration::from_millis(http.backoff_max_ms),
        }
    }

    /// 每次失敗後的等待時間，長度為 max_attempts - 1
    ///
    /// 第 n 次重試等待 base * 2^n 以內的隨機時間，不超過 max_delay。
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = self.base_delay.as_millis().max(1) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// 同一主機兩次請求之間保持最小間隔
struct HostThrottle {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl HostThrottle {
    fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(RateLimiter::keyed);
        HostThrottle { limiter }
    }

    async fn wait(&self, host: &str) {
        if let Some(limiter) = &self.limiter {
            limiter.until_key_ready(&host.to_string()).await;
        }
    }
}

/// 帶重試與節流的 HTTP 抓取器
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
    throttle: HostThrottle,
}

impl Fetcher {
    pub fn new(http: &config::Http) -> anyhow::Result<Self> {
        install_crypto_provider();

        let client = Client::builder()
            // ===== 壓縮 =====
            .brotli(true)
            .gzip(true)
            .zstd(true)
            // ===== 超時設置 =====
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .timeout(Duration::from_secs(http.timeout_secs))
            .tcp_nodelay(true)
            // ===== 連接池 =====
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            // ===== Cookie 和重定向 =====
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create reqwest client: {:?}", e))?;

        Ok(Fetcher {
            client,
            retry: RetryPolicy::from_config(http),
            throttle: HostThrottle::new(Duration::from_millis(http.host_interval_ms)),
        })
    }

    fn headers(kind: ContentKind) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&user_agent::gen_random_ua()) {
            headers.insert(header::USER_AGENT, ua);
        }

        let accept = match kind {
            ContentKind::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ContentKind::Csv => "text/csv,application/octet-stream;q=0.9,text/plain;q=0.8,*/*;q=0.5",
        };
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en-US;q=0.9,en;q=0.8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers
    }

    async fn attempt(
        &self,
        url: &Url,
        kind: ContentKind,
        attempt: usize,
    ) -> Result<String, FetchError> {
        let host = url.host_str().unwrap_or_default();
        self.throttle.wait(host).await;

        let visit_log = format!("Attempt {} to GET {}", attempt, url);
        let start = Instant::now();
        let result = self.send(url, kind).await;
        let elapsed = start.elapsed().as_millis();

        match &result {
            Ok(body) => {
                logging::info_file_async(format!("{} {} bytes {} ms", visit_log, body.len(), elapsed));
            }
            Err(why) => {
                logging::warn_file_async(format!("{} failed because {}. {} ms", visit_log, why, elapsed));
            }
        }

        result
    }

    async fn send(&self, url: &Url, kind: ContentKind) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .headers(Self::headers(kind))
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        let body = text::decode(&bytes, charset_of(&content_type));

        validate(url.as_str(), kind, &content_type, body)
    }
}

#[async_trait]
impl Fetch for Fetcher {
    /// 依重試策略抓取內容，全部失敗時回傳 `FetchError::Exhausted`
    async fn fetch(&self, url: &str, kind: ContentKind) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|why| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: why.to_string(),
        })?;

        let mut attempt = 0;
        let result = Retry::start(self.retry.delays(), || {
            attempt += 1;
            self.attempt(&parsed, kind, attempt)
        })
        .await;

        result.map_err(|last| FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.retry.max_attempts,
            last: last.to_string(),
        })
    }
}

fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("charset=")
            .or_else(|| part.strip_prefix("CHARSET="))
            .map(|v| v.trim_matches('"'))
    })
}

/// 檢查回應是否符合預期的內容種類
///
/// 預期 CSV 卻拿到 HTML（通常是被擋的頁面）、內容為空、或 CSV 不足兩行都視為失敗。
fn validate(
    url: &str,
    kind: ContentKind,
    content_type: &str,
    body: String,
) -> Result<String, FetchError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }

    let ct = content_type.to_ascii_lowercase();
    let unexpected = || FetchError::UnexpectedContent {
        url: url.to_string(),
        expected: kind,
        content_type: content_type.to_string(),
        head: trimmed.chars().take(200).collect::<String>().replace('\n', " "),
    };

    match kind {
        ContentKind::Csv => {
            let csv_like = ct.is_empty()
                || ct.contains("csv")
                || ct.contains("octet-stream")
                || ct.contains("text/plain");
            if !csv_like || trimmed.starts_with('<') {
                return Err(unexpected());
            }
            if trimmed.lines().filter(|l| !l.trim().is_empty()).count() < 2 {
                return Err(FetchError::EmptyBody {
                    url: url.to_string(),
                });
            }
        }
        ContentKind::Html => {
            if !ct.is_empty() && !ct.contains("html") && !ct.contains("xml") {
                return Err(unexpected());
            }
        }
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use crate::logging;

    use super::*;

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(600),
            max_delay: Duration::from_millis(8_000),
        }
    }

    #[test]
    fn test_retry_delays() {
        let delays: Vec<Duration> = policy(5).delays().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(8_000)));

        assert_eq!(policy(1).delays().count(), 0);
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(charset_of("text/csv; charset=Shift_JIS"), Some("Shift_JIS"));
        assert_eq!(charset_of("text/html;charset=\"utf-8\""), Some("utf-8"));
        assert_eq!(charset_of("text/html"), None);
    }

    #[test]
    fn test_validate_csv() {
        let url = "https://f.irbank.net/files/7203/qq-yoy-operating-income.csv";
        assert!(validate(url, ContentKind::Csv, "text/csv", "a,b\n1,2\n".to_string()).is_ok());
        assert!(validate(url, ContentKind::Csv, "", "a,b\n1,2\n".to_string()).is_ok());

        let blocked = validate(
            url,
            ContentKind::Csv,
            "text/html; charset=utf-8",
            "<html><body>Access denied</body></html>".to_string(),
        );
        assert!(matches!(blocked, Err(FetchError::UnexpectedContent { .. })));

        let disguised = validate(
            url,
            ContentKind::Csv,
            "application/octet-stream",
            "<!DOCTYPE html><html></html>".to_string(),
        );
        assert!(matches!(disguised, Err(FetchError::UnexpectedContent { .. })));

        let short = validate(url, ContentKind::Csv, "text/csv", "No data".to_string());
        assert!(matches!(short, Err(FetchError::EmptyBody { .. })));
    }

    #[test]
    fn test_validate_html() {
        let url = "https://kabutan.jp/stock/?code=7203";
        assert!(validate(url, ContentKind::Html, "text/html", "<html></html>".to_string()).is_ok());
        assert!(matches!(
            validate(url, ContentKind::Html, "text/html", "  \n".to_string()),
            Err(FetchError::EmptyBody { .. })
        ));
        assert!(matches!(
            validate(url, ContentKind::Html, "application/json", "{}".to_string()),
            Err(FetchError::UnexpectedContent { .. })
        ));
    }

    #[tokio::test]
    async fn test_throttle_spacing() {
        let throttle = HostThrottle::new(Duration::from_millis(200));
        let start = Instant::now();
        throttle.wait("kabutan.jp").await;
        throttle.wait("irbank.net").await;
        assert!(start.elapsed() < Duration::from_millis(150));

        throttle.wait("kabutan.jp").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_exhausted_on_invalid_host() {
        let http = crate::config::Http {
            max_attempts: 3,
            backoff_base_ms: 10,
            backoff_max_ms: 20,
            host_interval_ms: 0,
            ..Default::default()
        };
        let fetcher = Fetcher::new(&http).unwrap();
        let result = fetcher
            .fetch("http://kabu-crawler.invalid/stock", ContentKind::Html)
            .await;

        match result {
            Err(FetchError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_fetch_kabutan() {
        dotenv::dotenv().ok();
        logging::debug_file_async("開始 fetch".to_string());

        let fetcher = Fetcher::new(&crate::config::Http::default()).unwrap();
        match fetcher
            .fetch("https://kabutan.jp/stock/?code=7203", ContentKind::Html)
            .await
        {
            Ok(body) => logging::debug_file_async(format!("body length: {}", body.len())),
            Err(why) => logging::debug_file_async(format!("Failed to fetch because {:?}", why)),
        }

        logging::debug_file_async("結束 fetch".to_string());
    }
}
