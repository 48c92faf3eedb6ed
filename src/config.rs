use std::{env, path::PathBuf, str::FromStr};

use anyhow::Result;
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::{declare::Metric, logging};

const CONFIG_PATH: &str = "app.json";

/// 執行期設定，由 `App::get` 建立後以參考傳入各元件，之後不再變動
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub crawler: Crawler,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub sites: Sites,
    #[serde(default)]
    pub bounds: Bounds,
}

const TICKERS_FILE: &str = "TICKERS_FILE";
const OUTPUT_FILE: &str = "OUTPUT_FILE";
const OFFSET: &str = "OFFSET";
const MAX_TICKERS: &str = "MAX_TICKERS";
const WORKERS: &str = "WORKERS";
const TICKER_DELAY_MS: &str = "TICKER_DELAY_MS";
const SHUTDOWN_GRACE_MS: &str = "SHUTDOWN_GRACE_MS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Crawler {
    /// 股票代碼清單，一行一檔
    pub tickers_file: String,
    /// 輸出的 CSV 檔
    pub output_file: String,
    /// 分批執行時，跳過前面幾檔
    pub offset: usize,
    /// 分批執行時，最多處理幾檔；0 表示不限制
    pub max_tickers: usize,
    /// 同時處理的股票數，1 表示逐檔處理
    pub workers: usize,
    /// 每檔處理完後的間隔 (ms)
    pub ticker_delay_ms: u64,
    /// 收到中斷訊號後，等待處理中股票完成的最長時間 (ms)，逾時即放棄並輸出已完成的結果
    pub shutdown_grace_ms: u64,
}

impl Default for Crawler {
    fn default() -> Self {
        Crawler {
            tickers_file: "tickers.txt".to_string(),
            output_file: "metrics.csv".to_string(),
            offset: 0,
            max_tickers: 0,
            workers: 1,
            ticker_delay_ms: 600,
            shutdown_grace_ms: 30_000,
        }
    }
}

const HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
const HTTP_MAX_ATTEMPTS: &str = "HTTP_MAX_ATTEMPTS";
const HTTP_BACKOFF_BASE_MS: &str = "HTTP_BACKOFF_BASE_MS";
const HTTP_HOST_INTERVAL_MS: &str = "HTTP_HOST_INTERVAL_MS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Http {
    /// 單次請求逾時秒數 (15~25)
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// 每個網址最多嘗試次數 (3~6)
    pub max_attempts: usize,
    /// 重試的基礎等待時間 (ms)，之後每次加倍
    pub backoff_base_ms: u64,
    /// 重試等待時間上限 (ms)
    pub backoff_max_ms: u64,
    /// 同一主機兩次請求之間的最小間隔 (ms)，0 表示不限制
    pub host_interval_ms: u64,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            timeout_secs: 20,
            connect_timeout_secs: 8,
            max_attempts: 5,
            backoff_base_ms: 600,
            backoff_max_ms: 8_000,
            host_interval_ms: 800,
        }
    }
}

/// 各站點的網址樣板，`{code}` 會替換為股票代碼
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Sites {
    pub kabutan_overview: String,
    pub kabutan_finance: String,
    pub irbank_summary: String,
    pub irbank_quarterly_yoy: String,
    pub stooq_daily: String,
    /// `{p1}`、`{p2}` 為查詢區間的 unix timestamp
    pub yahoo_daily: String,
    /// Yahoo 查詢的天數
    pub yahoo_lookback_days: i64,
}

impl Default for Sites {
    fn default() -> Self {
        Sites {
            kabutan_overview: "https://kabutan.jp/stock/?code={code}".to_string(),
            kabutan_finance: "https://kabutan.jp/stock/finance?code={code}".to_string(),
            irbank_summary: "https://irbank.net/{code}".to_string(),
            irbank_quarterly_yoy: "https://f.irbank.net/files/{code}/qq-yoy-operating-income.csv"
                .to_string(),
            stooq_daily: "https://stooq.com/q/d/l/?s={code}.jp&i=d".to_string(),
            yahoo_daily: "https://query1.finance.yahoo.com/v7/finance/download/{code}.T?period1={p1}&period2={p2}&interval=1d&events=history&includeAdjustedClose=true".to_string(),
            yahoo_lookback_days: 220,
        }
    }
}

/// 數值的合理範圍（含端點）
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Bound { min, max }
    }
}

/// 各指標的合理範圍，超出範圍的數值視為抓錯欄位而捨棄
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Bounds {
    pub per: Bound,
    pub pbr: Bound,
    pub roe_pct: Bound,
    pub equity_ratio_pct: Bound,
    pub dividend_yield_pct: Bound,
    pub op_income_yoy_pct: Bound,
    pub credit_ratio: Bound,
    pub close: Bound,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            per: Bound::new(-1000.0, 1000.0),
            pbr: Bound::new(-100.0, 100.0),
            roe_pct: Bound::new(-200.0, 200.0),
            equity_ratio_pct: Bound::new(-100.0, 100.0),
            dividend_yield_pct: Bound::new(0.0, 100.0),
            op_income_yoy_pct: Bound::new(-1000.0, 1000.0),
            credit_ratio: Bound::new(0.0, 100_000.0),
            close: Bound::new(0.0, 10_000_000.0),
        }
    }
}

impl Bounds {
    /// 回傳指標的合理範圍，成交量相關欄位沒有範圍限制
    pub fn of(&self, metric: Metric) -> Option<Bound> {
        match metric {
            Metric::Per => Some(self.per),
            Metric::Pbr => Some(self.pbr),
            Metric::RoePct => Some(self.roe_pct),
            Metric::EquityRatioPct => Some(self.equity_ratio_pct),
            Metric::DividendYieldPct => Some(self.dividend_yield_pct),
            Metric::OpIncomeYoyPct => Some(self.op_income_yoy_pct),
            Metric::CreditRatio => Some(self.credit_ratio),
            Metric::Close => Some(self.close),
            Metric::Vol5 | Metric::Vol25 | Metric::VolRatio => None,
        }
    }
}

impl App {
    /// 讀取 app.json（不存在時使用預設值），再以環境變數覆蓋
    pub fn get() -> Result<Self> {
        let config_path = config_path();
        let app = if config_path.exists() {
            config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize::<App>()?
        } else {
            App::default()
        };

        Ok(app.override_with_env().clamp())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(path) = env::var(TICKERS_FILE) {
            self.crawler.tickers_file = path;
        }

        if let Ok(path) = env::var(OUTPUT_FILE) {
            self.crawler.output_file = path;
        }

        override_number(OFFSET, &mut self.crawler.offset);
        override_number(MAX_TICKERS, &mut self.crawler.max_tickers);
        override_number(WORKERS, &mut self.crawler.workers);
        override_number(TICKER_DELAY_MS, &mut self.crawler.ticker_delay_ms);
        override_number(SHUTDOWN_GRACE_MS, &mut self.crawler.shutdown_grace_ms);
        override_number(HTTP_TIMEOUT_SECS, &mut self.http.timeout_secs);
        override_number(HTTP_MAX_ATTEMPTS, &mut self.http.max_attempts);
        override_number(HTTP_BACKOFF_BASE_MS, &mut self.http.backoff_base_ms);
        override_number(HTTP_HOST_INTERVAL_MS, &mut self.http.host_interval_ms);

        self
    }

    /// 將數值限制在允許的範圍內
    fn clamp(mut self) -> Self {
        self.http.timeout_secs = self.http.timeout_secs.clamp(15, 25);
        self.http.max_attempts = self.http.max_attempts.clamp(3, 6);
        self.http.backoff_max_ms = self.http.backoff_max_ms.max(self.http.backoff_base_ms);
        self.crawler.workers = self.crawler.workers.clamp(1, 8);
        self
    }
}

fn override_number<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = env::var(key) {
        match T::from_str(raw.trim()) {
            Ok(value) => *target = value,
            Err(_) => {
                logging::warn_file_async(format!(
                    "Ignored env {}={} because it is not a valid number",
                    key, raw
                ));
            }
        }
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let app = App::default().clamp();
        assert_eq!(app.crawler.tickers_file, "tickers.txt");
        assert_eq!(app.crawler.output_file, "metrics.csv");
        assert_eq!(app.crawler.max_tickers, 0);
        assert_eq!(app.crawler.shutdown_grace_ms, 30_000);
        assert_eq!(app.http.timeout_secs, 20);
        assert_eq!(app.http.max_attempts, 5);
        assert!(app.sites.stooq_daily.contains("{code}"));
        assert_eq!(app.bounds.of(Metric::Vol5), None);
        assert_eq!(app.bounds.of(Metric::RoePct), Some(Bound::new(-200.0, 200.0)));
    }

    #[test]
    fn test_clamp() {
        let mut app = App::default();
        app.http.timeout_secs = 90;
        app.http.max_attempts = 1;
        app.crawler.workers = 0;
        let app = app.clamp();
        assert_eq!(app.http.timeout_secs, 25);
        assert_eq!(app.http.max_attempts, 3);
        assert_eq!(app.crawler.workers, 1);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let app: App = from_json(
            r#"{ "crawler": { "max_tickers": 50 }, "bounds": { "per": { "min": 0, "max": 500 } } }"#,
        );
        assert_eq!(app.crawler.max_tickers, 50);
        assert_eq!(app.crawler.tickers_file, "tickers.txt");
        assert_eq!(app.bounds.per, Bound::new(0.0, 500.0));
        assert_eq!(app.bounds.pbr, Bound::new(-100.0, 100.0));
    }

    fn from_json(json: &str) -> App {
        config_config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize::<App>()
            .unwrap()
    }
}
