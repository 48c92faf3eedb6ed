use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use strum::{AsRefStr, EnumIter};

use crate::{
    config::Sites,
    declare::{ContentKind, TickerCode},
    logging,
    util::http::{element::LabeledPage, table::CsvTable, Fetch},
};

/// 依序套用擷取規則並檢查合理範圍
pub mod extract;
/// 各指標的擷取規則
pub mod metrics;
/// 擷取規則
pub mod rule;

/// 資料來源
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    /// 株探 個股概要
    KabutanOverview,
    /// 株探 決算
    KabutanFinance,
    /// IRBANK 個股頁
    IrbankSummary,
    /// IRBANK 季度營業利益年增率 CSV
    IrbankQuarterlyYoy,
    /// Stooq 日線 CSV
    StooqDaily,
    /// Yahoo Finance 日線 CSV
    YahooDaily,
}

impl Source {
    pub fn kind(self) -> ContentKind {
        match self {
            Source::KabutanOverview | Source::KabutanFinance | Source::IrbankSummary => {
                ContentKind::Html
            }
            Source::IrbankQuarterlyYoy | Source::StooqDaily | Source::YahooDaily => {
                ContentKind::Csv
            }
        }
    }

    pub fn url(self, sites: &Sites, code: &TickerCode) -> String {
        self.url_at(sites, code, Utc::now())
    }

    fn url_at(self, sites: &Sites, code: &TickerCode, now: DateTime<Utc>) -> String {
        let template = match self {
            Source::KabutanOverview => &sites.kabutan_overview,
            Source::KabutanFinance => &sites.kabutan_finance,
            Source::IrbankSummary => &sites.irbank_summary,
            Source::IrbankQuarterlyYoy => &sites.irbank_quarterly_yoy,
            Source::StooqDaily => &sites.stooq_daily,
            Source::YahooDaily => &sites.yahoo_daily,
        };

        let url = template.replace("{code}", code.as_str());
        if self != Source::YahooDaily {
            return url;
        }

        let from = now - Duration::days(sites.yahoo_lookback_days.max(1));
        url.replace("{p1}", &from.timestamp().to_string())
            .replace("{p2}", &now.timestamp().to_string())
    }
}

/// 解析後的來源內容
#[derive(Debug, Clone)]
pub enum Document {
    Page(LabeledPage),
    Table(CsvTable),
}

impl Document {
    pub fn parse(kind: ContentKind, body: &str) -> Result<Self> {
        Ok(match kind {
            ContentKind::Html => Document::Page(LabeledPage::parse(body)),
            ContentKind::Csv => Document::Table(CsvTable::parse(body)?),
        })
    }

    pub fn as_page(&self) -> Option<&LabeledPage> {
        match self {
            Document::Page(page) => Some(page),
            Document::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&CsvTable> {
        match self {
            Document::Table(table) => Some(table),
            Document::Page(_) => None,
        }
    }
}

/// 單一股票的來源快取
///
/// 每個來源在同一檔股票內最多抓取一次，失敗的結果也會被記住，
/// 之後引用同一來源的規則直接跳過。
pub struct Pages<'a> {
    fetcher: &'a dyn Fetch,
    sites: &'a Sites,
    code: &'a TickerCode,
    documents: HashMap<Source, Option<Document>>,
}

impl<'a> Pages<'a> {
    pub fn new(fetcher: &'a dyn Fetch, sites: &'a Sites, code: &'a TickerCode) -> Self {
        Pages {
            fetcher,
            sites,
            code,
            documents: HashMap::new(),
        }
    }

    pub fn code(&self) -> &TickerCode {
        self.code
    }

    /// 取得來源內容，第一次呼叫時才會抓取
    pub async fn document(&mut self, source: Source) -> Option<&Document> {
        if !self.documents.contains_key(&source) {
            let document = self.load(source).await;
            self.documents.insert(source, document);
        }

        self.documents.get(&source).and_then(Option::as_ref)
    }

    /// 成功取得內容的來源數
    pub fn loaded(&self) -> usize {
        self.documents.values().filter(|d| d.is_some()).count()
    }

    async fn load(&self, source: Source) -> Option<Document> {
        let url = source.url(self.sites, self.code);
        let body = match self.fetcher.fetch(&url, source.kind()).await {
            Ok(body) => body,
            Err(why) => {
                logging::warn_file_async(format!(
                    "Failed to fetch {} for {} because {}",
                    source.as_ref(),
                    self.code,
                    why
                ));
                return None;
            }
        };

        match Document::parse(source.kind(), &body) {
            Ok(document) => Some(document),
            Err(why) => {
                logging::warn_file_async(format!(
                    "Failed to parse {} for {} because {:?}",
                    source.as_ref(),
                    self.code,
                    why
                ));
                None
            }
        }
    }
}
