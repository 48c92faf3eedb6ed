use std::{collections::HashSet, str::FromStr};

use anyhow::*;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

const NUMBER_ESCAPE_CHAR: &[char] = &['円', '倍', '%', ',', ' ', '"', '\n'];

/// 頁面上的數值，允許千分位逗號，▲/△ 代表負數
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([-▲△]?)\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)")
        .expect("Failed to compile number regex")
});

/// 標題中的單位，例如 (百万円)、(%)
static UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("Failed to compile unit regex"));

/// Folds full-width ASCII variants (Ｐ, １, （, ％ ...) and the ideographic space into
/// their half-width forms, and the various minus/dash glyphs into `-`.
pub fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' | '\u{00A0}' => ' ',
            '\u{2212}' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{FE63}' => '-',
            _ => c,
        })
        .collect()
}

/// Collapses every whitespace run into a single space and trims the ends.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Finds the first signed number in a piece of page text.
///
/// Full-width digits are folded first, thousands separators are dropped and a
/// leading `▲` or `△` (the Japanese minus marker) turns the value negative.
///
/// # Example
///
/// ```
/// assert_eq!(find_decimal("ＰＥＲ １２．５倍"), Some(dec!(12.5)));
/// assert_eq!(find_decimal("▲1,234"), Some(dec!(-1234)));
/// ```
pub fn find_decimal(s: &str) -> Option<Decimal> {
    let folded = fold_width(s);
    let caps = NUMBER_RE.captures(&folded)?;
    let digits = caps.get(2)?.as_str().replace(',', "");
    let value = Decimal::from_str(&digits).ok()?;

    match caps.get(1).map(|m| m.as_str()) {
        Some(sign) if !sign.is_empty() => Some(-value),
        _ => Some(value),
    }
}

/// Parses a whole CSV cell such as `1,234`, `12.5%` or `▲3.2` into a `Decimal`.
///
/// Unlike [`find_decimal`] the cell must contain nothing but the number and its
/// unit, so dates and free text are rejected.
pub fn parse_cell(s: &str) -> Option<Decimal> {
    let folded = fold_width(s);
    let trimmed = folded.trim();
    let (negative, digits) = match trimmed.strip_prefix(['▲', '△']) {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let value = parse_decimal(digits, None).ok()?;
    Some(if negative { -value } else { value })
}

/// Normalizes a column or cell label so that variants like `営業利益（百万円）`,
/// `営業利益(百万円)` and ` 営業利益 ` compare equal.
pub fn normalize_label(s: &str) -> String {
    let folded = fold_width(s);
    UNIT_RE
        .replace_all(&folded, "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '、')
        .collect::<String>()
        .to_lowercase()
}

/// Decodes a response body.
///
/// The charset named in the `Content-Type` header wins; without one the body is
/// tried as strict UTF-8 and then as Shift_JIS, which several Japanese sites still
/// serve their CSV files in.
pub fn decode(data: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|label| Encoding::for_label(label.trim().as_bytes()))
    {
        let (text, _, _) = encoding.decode(data);
        return text.into_owned();
    }

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(strip_bom(data)) {
        return text.into_owned();
    }

    let (text, _, _) = SHIFT_JIS.decode(data);
    text.into_owned()
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Parses a decimal value from a given string.
///
/// This function accepts a string representation of a decimal number,
/// potentially containing commas as thousands separators and unit suffixes,
/// and attempts to convert it into a `Decimal`.
///
/// # Arguments
///
/// * `s`: the text to parse.
/// * `escape_chars`: optional extra characters to strip before parsing.
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(&fold_width(s), escape_chars);
    Decimal::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.trim().chars().filter(|c| !filters.contains(c)).collect()
}
