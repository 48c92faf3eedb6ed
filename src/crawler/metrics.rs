//! 各指標的擷取順序
//!
//! 每個指標是一串規則，依序嘗試，第一個落在合理範圍內的數值即為結果。
//! 株探的個股概要優先，其次是決算頁，IRBANK 作為最後手段。

use crate::{
    crawler::{
        rule::{Label, Rule},
        Source,
    },
    declare::{Component, Metric},
};

const PER_LABELS: &[Label] = &[Label::Contains("PER")];
const PBR_LABELS: &[Label] = &[Label::Contains("PBR")];
const ROE_LABELS: &[Label] = &[Label::Contains("ROE")];
const YIELD_LABELS: &[Label] = &[Label::Contains("配当利回り"), Label::Contains("利回り")];
const CREDIT_LABELS: &[Label] = &[Label::Contains("信用倍率")];
const EQUITY_RATIO_LABELS: &[Label] = &[Label::Contains("自己資本比率")];
const OP_INCOME_YOY_LABELS: &[Label] = &[
    Label::Contains("前年同期比"),
    Label::Contains("YoY"),
    Label::Contains("営業利益"),
];

const PER: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanOverview,
        labels: PER_LABELS,
    },
    Rule::Text {
        source: Source::KabutanOverview,
        labels: PER_LABELS,
    },
];

const PBR: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanOverview,
        labels: PBR_LABELS,
    },
    Rule::Text {
        source: Source::KabutanOverview,
        labels: PBR_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: PBR_LABELS,
    },
];

const ROE: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanOverview,
        labels: ROE_LABELS,
    },
    Rule::Text {
        source: Source::KabutanOverview,
        labels: ROE_LABELS,
    },
    Rule::Cell {
        source: Source::KabutanFinance,
        labels: ROE_LABELS,
    },
    Rule::Text {
        source: Source::KabutanFinance,
        labels: ROE_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: ROE_LABELS,
    },
];

const DIVIDEND_YIELD: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanOverview,
        labels: YIELD_LABELS,
    },
    Rule::Text {
        source: Source::KabutanOverview,
        labels: YIELD_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: YIELD_LABELS,
    },
];

// 株探的信用倍率不在表格裡，先找文字
const CREDIT_RATIO: &[Rule] = &[
    Rule::Text {
        source: Source::KabutanOverview,
        labels: CREDIT_LABELS,
    },
    Rule::Cell {
        source: Source::KabutanOverview,
        labels: CREDIT_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: CREDIT_LABELS,
    },
];

const EQUITY_RATIO: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanFinance,
        labels: EQUITY_RATIO_LABELS,
    },
    Rule::Text {
        source: Source::KabutanFinance,
        labels: EQUITY_RATIO_LABELS,
    },
    Rule::Text {
        source: Source::KabutanOverview,
        labels: EQUITY_RATIO_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: EQUITY_RATIO_LABELS,
    },
];

// 第二欄即是年增率
const OP_INCOME_YOY: &[Rule] = &[Rule::Column {
    source: Source::IrbankQuarterlyYoy,
    labels: OP_INCOME_YOY_LABELS,
    fallback: Some(1),
}];

/// 直接顯示於頁面上的指標的擷取規則；成交量與收盤價另外計算，回傳空集合
pub fn rules(metric: Metric) -> &'static [Rule] {
    match metric {
        Metric::Per => PER,
        Metric::Pbr => PBR,
        Metric::RoePct => ROE,
        Metric::EquityRatioPct => EQUITY_RATIO,
        Metric::DividendYieldPct => DIVIDEND_YIELD,
        Metric::OpIncomeYoyPct => OP_INCOME_YOY,
        Metric::CreditRatio => CREDIT_RATIO,
        Metric::Vol5 | Metric::Vol25 | Metric::VolRatio | Metric::Close => &[],
    }
}

const EPS_LABELS: &[Label] = &[Label::Contains("1株益"), Label::Exact("EPS")];
const BPS_LABELS: &[Label] = &[Label::Contains("1株純資産"), Label::Exact("BPS")];
const DPS_LABELS: &[Label] = &[Label::Contains("1株配"), Label::Exact("DPS")];
const NET_INCOME_LABELS: &[Label] = &[Label::Contains("最終益"), Label::Contains("純利益")];
const EQUITY_LABELS: &[Label] = &[Label::Exact("自己資本"), Label::Exact("株主資本")];
const TOTAL_ASSETS_LABELS: &[Label] = &[Label::Contains("総資産")];

const EPS: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanFinance,
        labels: EPS_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: EPS_LABELS,
    },
];

const BPS: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanFinance,
        labels: BPS_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: BPS_LABELS,
    },
];

const DPS: &[Rule] = &[
    Rule::Cell {
        source: Source::KabutanFinance,
        labels: DPS_LABELS,
    },
    Rule::Text {
        source: Source::IrbankSummary,
        labels: DPS_LABELS,
    },
];

const NET_INCOME: &[Rule] = &[Rule::Cell {
    source: Source::KabutanFinance,
    labels: NET_INCOME_LABELS,
}];

const EQUITY: &[Rule] = &[Rule::Cell {
    source: Source::KabutanFinance,
    labels: EQUITY_LABELS,
}];

const TOTAL_ASSETS: &[Rule] = &[Rule::Cell {
    source: Source::KabutanFinance,
    labels: TOTAL_ASSETS_LABELS,
}];

/// 推算指標所需原始數據的擷取規則
pub fn component_rules(component: Component) -> &'static [Rule] {
    match component {
        Component::Eps => EPS,
        Component::Bps => BPS,
        Component::Dps => DPS,
        Component::NetIncome => NET_INCOME,
        Component::Equity => EQUITY,
        Component::TotalAssets => TOTAL_ASSETS,
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_every_scraped_metric_has_rules() {
        for metric in Metric::iter() {
            let expected = !matches!(
                metric,
                Metric::Vol5 | Metric::Vol25 | Metric::VolRatio | Metric::Close
            );
            assert_eq!(!rules(metric).is_empty(), expected, "{}", metric);
        }
    }

    #[test]
    fn test_kabutan_comes_first() {
        assert_eq!(rules(Metric::Per)[0].source(), Source::KabutanOverview);
        assert_eq!(rules(Metric::EquityRatioPct)[0].source(), Source::KabutanFinance);
        assert_eq!(
            rules(Metric::RoePct).last().map(Rule::source),
            Some(Source::IrbankSummary)
        );
    }
}
