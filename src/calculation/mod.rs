/// 由原始數據推算指標
pub mod derived;
/// 成交量統計
pub mod volume;
