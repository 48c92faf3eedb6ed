use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::{
    config::Bound,
    crawler::{rule::Rule, Pages},
    logging,
};

/// 依序套用規則，回傳第一個落在合理範圍內的數值
///
/// 規則引用的來源在第一次用到時才抓取；抓取失敗、找不到數值或超出範圍都改試下一條規則。
pub async fn extract(pages: &mut Pages<'_>, rules: &[Rule], bound: Option<Bound>) -> Option<Decimal> {
    for rule in rules {
        let code = pages.code().clone();
        let Some(document) = pages.document(rule.source()).await else {
            continue;
        };

        let Some(value) = rule.apply(document) else {
            continue;
        };

        if within(bound, value) {
            return Some(value);
        }

        logging::debug_file_async(format!(
            "Discarded {} for {} from {} because it is outside {:?}",
            value,
            code,
            rule.source().as_ref(),
            bound
        ));
    }

    None
}

/// 數值是否落在範圍內（含端點），沒有範圍時一律接受
pub fn within(bound: Option<Bound>, value: Decimal) -> bool {
    match bound {
        None => true,
        Some(bound) => value
            .to_f64()
            .is_some_and(|v| v >= bound.min && v <= bound.max),
    }
}

/// 超出範圍的數值視為不存在
pub fn sanitize(value: Option<Decimal>, bound: Option<Bound>) -> Option<Decimal> {
    value.filter(|v| within(bound, *v))
}
