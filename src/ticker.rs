use std::{fs, path::Path};

use anyhow::{Context, Result};
use hashbrown::HashSet;

use crate::{declare::TickerCode, util::text};

/// 將清單中的一行轉成股票代碼
///
/// 只取第一個欄位（以空白、逗號或 tab 分隔），轉半形、轉大寫後去掉英數字以外的字元，
/// 剩下空字串時回傳 None。
pub fn normalize(line: &str) -> Option<TickerCode> {
    let folded = text::fold_width(line);
    let first = folded
        .split(|c: char| c.is_whitespace() || c == ',' || c == '\t')
        .find(|token| !token.is_empty())?;

    let code: String = first
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if code.is_empty() {
        return None;
    }

    Some(TickerCode::new(code))
}

/// 解析整份清單，重複的代碼只保留第一次出現的位置
pub fn parse_tickers(content: &str) -> Vec<TickerCode> {
    let mut seen = HashSet::new();
    content
        .lines()
        .filter_map(normalize)
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// 讀取股票代碼清單檔
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<TickerCode>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ticker file {}", path.display()))?;

    Ok(parse_tickers(content.trim_start_matches('\u{feff}')))
}

/// 分批執行時選取的範圍：先跳過 `offset` 檔，`max_tickers` 大於 0 時最多取這麼多檔
pub fn select_range(tickers: Vec<TickerCode>, offset: usize, max_tickers: usize) -> Vec<TickerCode> {
    let remaining = tickers.into_iter().skip(offset);
    if max_tickers > 0 {
        remaining.take(max_tickers).collect()
    } else {
        remaining.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(tickers: &[TickerCode]) -> Vec<&str> {
        tickers.iter().map(TickerCode::as_str).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("7203").map(|c| c.to_string()), Some("7203".to_string()));
        assert_eq!(normalize("  215a トヨタ").map(|c| c.to_string()), Some("215A".to_string()));
        assert_eq!(normalize("７２０３,トヨタ自動車").map(|c| c.to_string()), Some("7203".to_string()));
        assert_eq!(normalize("9984.T\tSoftBank").map(|c| c.to_string()), Some("9984T".to_string()));
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("トヨタ"), None);
    }

    #[test]
    fn test_parse_tickers_dedupes_in_order() {
        let tickers = parse_tickers("7203\n\n7203\n9999Z\n");
        assert_eq!(codes(&tickers), vec!["7203", "9999Z"]);

        let tickers = parse_tickers("6758\n7203\n６７５８\n");
        assert_eq!(codes(&tickers), vec!["6758", "7203"]);
    }

    #[test]
    fn test_select_range() {
        let tickers = parse_tickers("1301\n1332\n1333\n1375\n1376\n");
        assert_eq!(codes(&select_range(tickers.clone(), 1, 2)), vec!["1332", "1333"]);
        assert_eq!(codes(&select_range(tickers.clone(), 3, 0)), vec!["1375", "1376"]);
        assert_eq!(codes(&select_range(tickers.clone(), 0, 0)).len(), 5);
        assert!(select_range(tickers, 10, 2).is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load("does/not/exist/tickers.txt").is_err());
    }
}
