pub mod http;
/// 文字與數值處理
pub mod text;
