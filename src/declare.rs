use std::fmt;

use rust_decimal::Decimal;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// 股票代碼，例如 7203、215A
///
/// 只會透過 `ticker::normalize` 建立，內容必為大寫英數字且不為空。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickerCode(String);

impl TickerCode {
    pub(crate) fn new(code: String) -> Self {
        TickerCode(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TickerCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TickerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 預期的回應內容種類
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum ContentKind {
    Html,
    Csv,
}

/// 輸出檔的指標欄位，順序即 CSV 欄位順序
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    /// 本益比
    Per,
    /// 股價淨值比
    Pbr,
    /// 股東權益報酬率 (%)
    RoePct,
    /// 自有資本比率 (%)
    EquityRatioPct,
    /// 殖利率 (%)
    DividendYieldPct,
    /// 營業利益年增率 (%)
    OpIncomeYoyPct,
    /// 信用倍率
    CreditRatio,
    /// 5 日均量
    #[strum(serialize = "vol5")]
    Vol5,
    /// 25 日均量
    #[strum(serialize = "vol25")]
    Vol25,
    /// 5 日均量 / 25 日均量
    #[strum(serialize = "volratio_5_25")]
    VolRatio,
    /// 收盤價
    Close,
}

/// 用來推算指標的原始數據
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum Component {
    /// 每股盈餘
    Eps,
    /// 每股淨值
    Bps,
    /// 每股股利
    Dps,
    /// 稅後淨利
    NetIncome,
    /// 股東權益
    Equity,
    /// 總資產
    TotalAssets,
}

/// 單一股票的指標，取不到的欄位為 None（不是 0）
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub code: TickerCode,
    pub per: Option<Decimal>,
    pub pbr: Option<Decimal>,
    pub roe_pct: Option<Decimal>,
    pub equity_ratio_pct: Option<Decimal>,
    pub dividend_yield_pct: Option<Decimal>,
    pub op_income_yoy_pct: Option<Decimal>,
    pub credit_ratio: Option<Decimal>,
    pub vol5: Option<Decimal>,
    pub vol25: Option<Decimal>,
    pub volratio_5_25: Option<Decimal>,
    pub close: Option<Decimal>,
}

impl MetricRecord {
    /// 建立一筆全部欄位皆為空的紀錄
    pub fn new(code: TickerCode) -> Self {
        MetricRecord {
            code,
            per: None,
            pbr: None,
            roe_pct: None,
            equity_ratio_pct: None,
            dividend_yield_pct: None,
            op_income_yoy_pct: None,
            credit_ratio: None,
            vol5: None,
            vol25: None,
            volratio_5_25: None,
            close: None,
        }
    }

    pub fn get(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::Per => self.per,
            Metric::Pbr => self.pbr,
            Metric::RoePct => self.roe_pct,
            Metric::EquityRatioPct => self.equity_ratio_pct,
            Metric::DividendYieldPct => self.dividend_yield_pct,
            Metric::OpIncomeYoyPct => self.op_income_yoy_pct,
            Metric::CreditRatio => self.credit_ratio,
            Metric::Vol5 => self.vol5,
            Metric::Vol25 => self.vol25,
            Metric::VolRatio => self.volratio_5_25,
            Metric::Close => self.close,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<Decimal>) {
        let slot = match metric {
            Metric::Per => &mut self.per,
            Metric::Pbr => &mut self.pbr,
            Metric::RoePct => &mut self.roe_pct,
            Metric::EquityRatioPct => &mut self.equity_ratio_pct,
            Metric::DividendYieldPct => &mut self.dividend_yield_pct,
            Metric::OpIncomeYoyPct => &mut self.op_income_yoy_pct,
            Metric::CreditRatio => &mut self.credit_ratio,
            Metric::Vol5 => &mut self.vol5,
            Metric::Vol25 => &mut self.vol25,
            Metric::VolRatio => &mut self.volratio_5_25,
            Metric::Close => &mut self.close,
        };
        *slot = value;
    }

    /// 有取得數值的欄位數
    pub fn filled(&self) -> usize {
        Metric::iter().filter(|m| self.get(*m).is_some()).count()
    }
}
