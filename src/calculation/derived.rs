//! 頁面上沒有直接顯示指標時，以原始數據推算
//!
//! 任何輸入缺漏或分母為 0 時回傳 None，不會產生錯誤。

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::declare::{Component, Metric};

/// 推算所需的原始數據
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Components {
    pub close: Option<Decimal>,
    pub eps: Option<Decimal>,
    pub bps: Option<Decimal>,
    pub dps: Option<Decimal>,
    pub net_income: Option<Decimal>,
    pub equity: Option<Decimal>,
    pub total_assets: Option<Decimal>,
}

impl Components {
    pub fn set(&mut self, component: Component, value: Option<Decimal>) {
        let slot = match component {
            Component::Eps => &mut self.eps,
            Component::Bps => &mut self.bps,
            Component::Dps => &mut self.dps,
            Component::NetIncome => &mut self.net_income,
            Component::Equity => &mut self.equity,
            Component::TotalAssets => &mut self.total_assets,
        };
        *slot = value;
    }

    /// 依指標推算，不能推算的指標回傳 None
    pub fn derive(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::Per => per(self.close, self.eps),
            Metric::Pbr => pbr(self.close, self.bps),
            Metric::RoePct => roe_pct(self.net_income, self.equity),
            Metric::EquityRatioPct => equity_ratio_pct(self.equity, self.total_assets),
            Metric::DividendYieldPct => dividend_yield_pct(self.dps, self.close),
            _ => None,
        }
    }

    /// 推算 `metric` 時需要的原始數據
    pub fn required(metric: Metric) -> &'static [Component] {
        match metric {
            Metric::Per => &[Component::Eps],
            Metric::Pbr => &[Component::Bps],
            Metric::RoePct => &[Component::NetIncome, Component::Equity],
            Metric::EquityRatioPct => &[Component::Equity, Component::TotalAssets],
            Metric::DividendYieldPct => &[Component::Dps],
            _ => &[],
        }
    }
}

fn ratio(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    numerator?.checked_div(denominator?)
}

fn percent(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    ratio(numerator, denominator)?.checked_mul(dec!(100))
}

/// 本益比 = 收盤價 / EPS
pub fn per(close: Option<Decimal>, eps: Option<Decimal>) -> Option<Decimal> {
    ratio(close, eps)
}

/// 股價淨值比 = 收盤價 / 每股淨值
pub fn pbr(close: Option<Decimal>, bps: Option<Decimal>) -> Option<Decimal> {
    ratio(close, bps)
}

pub fn roe_pct(net_income: Option<Decimal>, equity: Option<Decimal>) -> Option<Decimal> {
    percent(net_income, equity)
}

pub fn equity_ratio_pct(equity: Option<Decimal>, total_assets: Option<Decimal>) -> Option<Decimal> {
    percent(equity, total_assets)
}

pub fn dividend_yield_pct(dps: Option<Decimal>, close: Option<Decimal>) -> Option<Decimal> {
    percent(dps, close)
}
