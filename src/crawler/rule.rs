use std::sync::RwLock;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    crawler::{Document, Source},
    util::text,
};

/// 已編譯的文字規則，每個標題只編譯一次
static PATTERNS: Lazy<RwLock<HashMap<Label, Regex>>> = Lazy::new(Default::default);

/// 標題比對方式
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// 標題包含此文字
    Contains(&'static str),
    /// 標題與此文字完全相同，例如「自己資本」不可符合「自己資本比率」
    Exact(&'static str),
}

impl Label {
    pub fn text(&self) -> &'static str {
        match self {
            Label::Contains(s) | Label::Exact(s) => *s,
        }
    }

    /// `normalized` 需先經過 `text::normalize_label`
    pub fn matches(&self, normalized: &str) -> bool {
        let wanted = text::normalize_label(self.text());
        if wanted.is_empty() {
            return false;
        }

        match self {
            Label::Contains(_) => normalized.contains(&wanted),
            Label::Exact(_) => normalized == wanted,
        }
    }

    /// 在頁面文字中找「標題 + 少量非數字字元 + 數值」
    fn pattern(&self) -> Option<Regex> {
        if let Some(regex) = PATTERNS.read().ok().and_then(|cache| cache.get(self).cloned()) {
            return Some(regex);
        }

        let label = regex::escape(&text::fold_width(self.text()));
        let number = r"([-▲△]?\d[\d,]*(?:\.\d+)?)";
        let pattern = match self {
            Label::Contains(_) => format!(r"(?i){}[^0-9\-▲△]{{0,16}}?{}", label, number),
            // 標題後面必須緊接分隔符號，避免吃到較長的標題
            Label::Exact(_) => format!(r"(?i){}(?:[\s:(][^0-9\-▲△]{{0,15}}?)?{}", label, number),
        };

        let regex = Regex::new(&pattern).ok()?;
        if let Ok(mut cache) = PATTERNS.write() {
            cache.insert(*self, regex.clone());
        }

        Some(regex)
    }
}

/// 從單一來源取出一個數值的規則
#[derive(Debug, Copy, Clone)]
pub enum Rule {
    /// 表格或定義清單中，標題儲存格旁的數值
    Cell {
        source: Source,
        labels: &'static [Label],
    },
    /// CSV 中標題符合的欄位的最新數值，找不到標題時改用 `fallback` 欄位
    Column {
        source: Source,
        labels: &'static [Label],
        fallback: Option<usize>,
    },
    /// 頁面文字中標題後面的第一個數值
    Text {
        source: Source,
        labels: &'static [Label],
    },
}

impl Rule {
    pub fn source(&self) -> Source {
        match self {
            Rule::Cell { source, .. } | Rule::Column { source, .. } | Rule::Text { source, .. } => {
                *source
            }
        }
    }

    /// 套用規則；來源種類不符或找不到數值時回傳 None
    pub fn apply(&self, document: &Document) -> Option<Decimal> {
        match self {
            Rule::Cell { labels, .. } => {
                let page = document.as_page()?;
                labels.iter().find_map(|label| {
                    page.values_where(move |l| label.matches(l))
                        .find_map(text::find_decimal)
                })
            }
            Rule::Column {
                labels, fallback, ..
            } => {
                let table = document.as_table()?;
                let index = labels
                    .iter()
                    .find_map(|label| table.column_index(|h| label.matches(h)))
                    .or(fallback.filter(|i| *i < table.headers().len()))?;
                table.latest(index)
            }
            Rule::Text { labels, .. } => {
                let page = document.as_page()?;
                labels.iter().find_map(|label| {
                    label
                        .pattern()?
                        .captures_iter(page.text())
                        .find_map(|caps| caps.get(1).and_then(|m| text::find_decimal(m.as_str())))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::declare::ContentKind;

    const FINANCE: &str = r#"<html><body>
        <table>
          <tr><th>決算期</th><th>自己資本</th><th>自己資本比率</th><th>総資産</th></tr>
          <tr><td>2024.03</td><td>35,000,000</td><td>38.1</td><td>90,000,000</td></tr>
        </table>
        <p>ROE（自己資本利益率） １５．２％ 信用倍率 ▲3.5倍</p>
        </body></html>"#;

    fn page(html: &str) -> Document {
        Document::parse(ContentKind::Html, html).unwrap()
    }

    #[test]
    fn test_label_matches() {
        assert!(Label::Contains("PER").matches("per(倍)"));
        assert!(Label::Contains("自己資本").matches("自己資本比率"));
        assert!(!Label::Exact("自己資本").matches("自己資本比率"));
        assert!(Label::Exact("自己資本").matches(&text::normalize_label("自己資本 (百万円)")));
    }

    #[test]
    fn test_cell_rule() {
        let doc = page(FINANCE);
        let equity = Rule::Cell {
            source: Source::KabutanFinance,
            labels: &[Label::Exact("自己資本")],
        };
        assert_eq!(equity.apply(&doc), Some(dec!(35000000)));

        let ratio = Rule::Cell {
            source: Source::KabutanFinance,
            labels: &[Label::Contains("自己資本比率")],
        };
        assert_eq!(ratio.apply(&doc), Some(dec!(38.1)));

        let missing = Rule::Cell {
            source: Source::KabutanFinance,
            labels: &[Label::Contains("PBR")],
        };
        assert_eq!(missing.apply(&doc), None);
    }

    #[test]
    fn test_cell_rule_multi_year_table() {
        let doc = page(
            r#"<table>
              <tr><th>決算期</th><th>最終益</th><th>１株益</th></tr>
              <tr><td>2021.03</td><td>1,000</td><td>10.0</td></tr>
              <tr><td>2022.03</td><td>2,000</td><td>20.0</td></tr>
              <tr><td>2023.03</td><td>3,000</td><td>30.0</td></tr>
              <tr><td>2024.03</td><td>4,000</td><td>40.0</td></tr>
            </table>"#,
        );
        let eps = Rule::Cell {
            source: Source::KabutanFinance,
            labels: &[Label::Contains("1株益")],
        };
        assert_eq!(eps.apply(&doc), Some(dec!(40.0)));
    }

    #[test]
    fn test_text_rule() {
        let doc = page(FINANCE);
        let roe = Rule::Text {
            source: Source::KabutanFinance,
            labels: &[Label::Contains("ROE")],
        };
        assert_eq!(roe.apply(&doc), Some(dec!(15.2)));

        let credit = Rule::Text {
            source: Source::KabutanFinance,
            labels: &[Label::Contains("信用倍率")],
        };
        assert_eq!(credit.apply(&doc), Some(dec!(-3.5)));
    }

    #[test]
    fn test_text_pattern_is_cached() {
        let label = Label::Contains("配当性向");
        let first = label.pattern().unwrap();
        assert!(PATTERNS.read().unwrap().contains_key(&label));

        let second = label.pattern().unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(first.is_match("配当性向 35.2%"));
    }

    #[test]
    fn test_column_rule() {
        let csv = "年度,営業利益,前年同期比（％）\n2024/06,100,10.2\n2024/09,90,-4.5\n";
        let doc = Document::parse(ContentKind::Csv, csv).unwrap();
        let yoy = Rule::Column {
            source: Source::IrbankQuarterlyYoy,
            labels: &[Label::Contains("前年同期比"), Label::Contains("営業利益")],
            fallback: Some(1),
        };
        assert_eq!(yoy.apply(&doc), Some(dec!(-4.5)));

        let fallback = Rule::Column {
            source: Source::IrbankQuarterlyYoy,
            labels: &[Label::Contains("YoY")],
            fallback: Some(1),
        };
        assert_eq!(fallback.apply(&doc), Some(dec!(90)));

        let out_of_range = Rule::Column {
            source: Source::IrbankQuarterlyYoy,
            labels: &[Label::Contains("YoY")],
            fallback: Some(7),
        };
        assert_eq!(out_of_range.apply(&doc), None);
    }

    #[test]
    fn test_rule_kind_mismatch() {
        let doc = page(FINANCE);
        let column = Rule::Column {
            source: Source::StooqDaily,
            labels: &[Label::Contains("Volume")],
            fallback: None,
        };
        assert_eq!(column.apply(&doc), None);
    }
}
