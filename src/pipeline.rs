use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use futures::{stream, Stream, StreamExt};
use hashbrown::HashSet;
use rand::Rng;
use rust_decimal::Decimal;
use strum::IntoEnumIterator;
use tokio::time::Instant;

use crate::{
    calculation::{derived::Components, volume::VolumeStats},
    config::App,
    crawler::{
        extract::{extract, sanitize},
        metrics, Document, Pages, Source,
    },
    declare::{Metric, MetricRecord, TickerCode},
    logging,
    util::http::Fetch,
};

/// 計算 25 日均量需要的天數
const FULL_SERIES: usize = 25;

/// 日線資料：由舊到新的成交量與最新收盤價
#[derive(Debug, Default)]
struct DailySeries {
    volumes: Vec<Decimal>,
    close: Option<Decimal>,
}

impl DailySeries {
    fn from_document(document: &Document) -> Option<Self> {
        let table = document.as_table()?;
        let volume = table.column_index(|h| h == "volume")?;
        let close = table
            .column_index(|h| h == "close")
            .and_then(|index| table.latest(index));

        Some(DailySeries {
            volumes: table
                .series(volume)
                .into_iter()
                .filter(|v| !v.is_sign_negative())
                .collect(),
            close,
        })
    }
}

/// 逐檔抓取、擷取並推算指標
pub struct Pipeline<'a> {
    fetcher: &'a dyn Fetch,
    app: &'a App,
}

impl<'a> Pipeline<'a> {
    pub fn new(fetcher: &'a dyn Fetch, app: &'a App) -> Self {
        Pipeline { fetcher, app }
    }

    /// 依輸入順序處理每一檔股票，每檔恰好產生一筆紀錄
    ///
    /// `shutdown` 每產生一個項目代表一次中斷訊號。第一次之後不再開始新的股票，
    /// 等處理中的股票完成後回傳目前為止的結果；第二次訊號或超過 `shutdown_grace_ms`
    /// 時直接放棄處理中的股票。
    pub async fn run<S>(&self, tickers: &[TickerCode], shutdown: S) -> Vec<MetricRecord>
    where
        S: Stream<Item = ()>,
    {
        let total = tickers.len();
        let grace_period = Duration::from_millis(self.app.crawler.shutdown_grace_ms);
        let stopping = AtomicBool::new(false);
        let mut records = Vec::with_capacity(total);

        let mut results = stream::iter(tickers.iter().enumerate())
            .map(|(index, code)| self.process(index, total, code, &stopping))
            .buffered(self.app.crawler.workers.max(1));

        tokio::pin!(shutdown);
        let grace = tokio::time::sleep(grace_period);
        tokio::pin!(grace);
        let mut listening = true;
        let mut shutdown_received = false;
        let mut abandoned = false;

        loop {
            tokio::select! {
                biased;
                signal = shutdown.next(), if listening => match signal {
                    None => listening = false,
                    Some(()) if !shutdown_received => {
                        shutdown_received = true;
                        stopping.store(true, Ordering::SeqCst);
                        grace.as_mut().reset(Instant::now() + grace_period);
                        logging::warn_file_async(
                            "Shutdown requested, waiting for the tickers in progress".to_string(),
                        );
                        logging::info_console(format!(
                            "Stopping after the tickers in progress (at most {} ms), press Ctrl-C again to stop now",
                            grace_period.as_millis()
                        ));
                    }
                    Some(()) => {
                        logging::warn_file_async(
                            "Second shutdown request, abandoning the tickers in progress".to_string(),
                        );
                        abandoned = true;
                        break;
                    }
                },
                _ = &mut grace, if shutdown_received => {
                    logging::warn_file_async(format!(
                        "Tickers in progress did not finish within {} ms, abandoning them",
                        grace_period.as_millis()
                    ));
                    abandoned = true;
                    break;
                }
                next = results.next() => match next {
                    Some(Some(record)) => records.push(record),
                    Some(None) => {}
                    None => break,
                }
            }
        }

        // 放棄時一併丟棄尚未完成的請求
        drop(results);

        if shutdown_received {
            logging::warn_file_async(format!(
                "Stopped early{}, {} of {} tickers processed",
                if abandoned { " and abandoned the tickers in progress" } else { "" },
                records.len(),
                total
            ));
        }

        records
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        code: &TickerCode,
        stopping: &AtomicBool,
    ) -> Option<MetricRecord> {
        if stopping.load(Ordering::SeqCst) {
            return None;
        }

        logging::info_file_async(format!("[{}/{}] {} start", index + 1, total, code));
        let record = self.collect(code).await;
        logging::info_file_async(format!(
            "[{}/{}] {} done, {} metrics filled",
            index + 1,
            total,
            code,
            record.filled()
        ));

        if !stopping.load(Ordering::SeqCst) {
            self.polite_delay().await;
        }

        Some(record)
    }

    /// 取得單一股票的所有指標；任何來源失敗都只會讓對應欄位為空
    pub async fn collect(&self, code: &TickerCode) -> MetricRecord {
        let mut pages = Pages::new(self.fetcher, &self.app.sites, code);
        let mut record = MetricRecord::new(code.clone());

        let series = self.daily_series(&mut pages).await;
        let stats = VolumeStats::from_series(&series.volumes);
        record.vol5 = stats.vol5;
        record.vol25 = stats.vol25;
        record.volratio_5_25 = stats.ratio;
        record.close = sanitize(
            series.close.filter(|c| c.is_sign_positive() && !c.is_zero()),
            self.app.bounds.of(Metric::Close),
        );

        let mut components = Components {
            close: record.close,
            ..Default::default()
        };
        let mut tried = HashSet::new();

        for metric in Metric::iter() {
            let rules = metrics::rules(metric);
            if rules.is_empty() {
                continue;
            }

            let bound = self.app.bounds.of(metric);
            let mut value = extract(&mut pages, rules, bound).await;

            if value.is_none() {
                for component in Components::required(metric) {
                    if tried.insert(*component) {
                        let raw = extract(&mut pages, metrics::component_rules(*component), None).await;
                        components.set(*component, raw);
                    }
                }

                value = sanitize(components.derive(metric), bound);
                if let Some(derived) = value {
                    logging::debug_file_async(format!(
                        "{} of {} derived as {}",
                        metric, code, derived
                    ));
                }
            }

            record.set(metric, value);
        }

        if pages.loaded() == 0 {
            logging::error_file_async(format!("Every source failed for {}", code));
        }

        record
    }

    /// 先用 Stooq，資料不足 25 天時改試 Yahoo，取天數較多的一方
    async fn daily_series(&self, pages: &mut Pages<'_>) -> DailySeries {
        let stooq = pages
            .document(Source::StooqDaily)
            .await
            .and_then(DailySeries::from_document)
            .unwrap_or_default();
        if stooq.volumes.len() >= FULL_SERIES {
            return stooq;
        }

        let yahoo = pages
            .document(Source::YahooDaily)
            .await
            .and_then(DailySeries::from_document)
            .unwrap_or_default();
        if yahoo.volumes.len() > stooq.volumes.len() {
            yahoo
        } else {
            stooq
        }
    }

    /// 每檔之間的間隔，加上最多四分之一的隨機抖動
    async fn polite_delay(&self) {
        let base = self.app.crawler.ticker_delay_ms;
        if base == 0 {
            return;
        }

        let jitter = rand::rng().random_range(0..=base / 4);
        tokio::time::sleep(Duration::from_millis(base + jitter)).await;
    }
}
