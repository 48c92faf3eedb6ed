use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::util::text;

/// 解析後的 CSV：標題列與資料列
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// 解析 CSV 內容，各列欄位數可以不一致，欄位值前後空白會被去掉
    pub fn parse(body: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.trim_start_matches('\u{feff}').as_bytes());

        let headers = reader
            .headers()
            .context("Failed to read csv headers")?
            .iter()
            .map(text::normalize_label)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read csv record")?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(CsvTable { headers, rows })
    }

    /// 正規化後的標題
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 第一個標題符合條件的欄位索引
    pub fn column_index<F>(&self, matches: F) -> Option<usize>
    where
        F: Fn(&str) -> bool,
    {
        self.headers.iter().position(|h| matches(h))
    }

    /// 欄位中最後一個可以解析成數值的值
    pub fn latest(&self, index: usize) -> Option<Decimal> {
        self.rows
            .iter()
            .rev()
            .find_map(|row| row.get(index).and_then(|cell| text::parse_cell(cell)))
    }

    /// 欄位由舊到新的數值，無法解析的列會被略過
    pub fn series(&self, index: usize) -> Vec<Decimal> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).and_then(|cell| text::parse_cell(cell)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const YOY: &str = "\u{feff}年度,営業利益（百万円）,前年同期比（％）\n\
        2024/06,\"1,308,000\",10.2\n\
        2024/09,\"1,160,000\",▲5.6\n\
        2024/12,\"1,200,000\",-\n";

    #[test]
    fn test_parse_headers() {
        let table = CsvTable::parse(YOY).unwrap();
        assert_eq!(table.headers(), ["年度", "営業利益", "前年同期比"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_latest_skips_non_numeric() {
        let table = CsvTable::parse(YOY).unwrap();
        let yoy = table.column_index(|h| h.contains("前年同期比")).unwrap();
        assert_eq!(table.latest(yoy), Some(dec!(-5.6)));

        let income = table.column_index(|h| h == "営業利益").unwrap();
        assert_eq!(table.latest(income), Some(dec!(1200000)));
        assert_eq!(table.column_index(|h| h == "yoy"), None);
    }

    #[test]
    fn test_series() {
        let body = "Date,Open,High,Low,Close,Volume\n\
            2025-01-06,100,110,95,105,1000\n\
            2025-01-07,105,112,101,110,\n\
            2025-01-08,110,115,108,112,3000\n";
        let table = CsvTable::parse(body).unwrap();
        let volume = table.column_index(|h| h == "volume").unwrap();
        assert_eq!(table.series(volume), vec![dec!(1000), dec!(3000)]);

        let close = table.column_index(|h| h == "close").unwrap();
        assert_eq!(table.latest(close), Some(dec!(112)));
    }
}
