use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

use crate::util::text;

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to parse table selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to parse tr selector"));
static TERM: Lazy<Selector> = Lazy::new(|| Selector::parse("dt").expect("Failed to parse dt selector"));
static BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to parse body selector"));

/// 頁面上一組「標題 → 數值」的儲存格
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledCell {
    /// 經 `text::normalize_label` 處理過的標題
    pub label: String,
    /// 相鄰儲存格的文字
    pub value: String,
}

/// 解析後的 HTML 頁面，只保留擷取數值需要的部分
///
/// `scraper::Html` 不能跨 await 保存，因此抓到頁面後立即轉成這個結構。
#[derive(Debug, Clone, Default)]
pub struct LabeledPage {
    cells: Vec<LabeledCell>,
    text: String,
}

impl LabeledPage {
    /// Parses an HTML document into its labeled cells and its flattened text.
    ///
    /// A cell pair is produced for
    /// * a `th` (or a row's first `td`) followed by a `td` in the same row,
    /// * every column of a row made only of `th`, paired with the same column of the
    ///   next row,
    /// * a `dt` followed by its `dd`.
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut cells = Vec::new();

        for table in document.select(&TABLE) {
            collect_table_cells(table, &mut cells);
        }

        for term in document.select(&TERM) {
            let definition = term
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .next()
                .filter(|e| e.value().name() == "dd");
            if let Some(dd) = definition {
                push_cell(&mut cells, term, dd);
            }
        }

        LabeledPage {
            cells,
            text: page_text(&document),
        }
    }

    /// 全頁文字，已轉半形並壓縮空白
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 依序回傳標題符合條件的儲存格內容
    pub fn values_where<'a, F>(&'a self, matches: F) -> impl Iterator<Item = &'a str> + 'a
    where
        F: Fn(&str) -> bool + 'a,
    {
        self.cells
            .iter()
            .filter(move |cell| matches(&cell.label))
            .map(|cell| cell.value.as_str())
    }
}

fn collect_table_cells(table: ElementRef, cells: &mut Vec<LabeledCell>) {
    // 只取屬於這個 table 的 tr，巢狀 table 會另外處理
    let rows: Vec<Vec<ElementRef>> = table
        .select(&ROW)
        .filter(|row| nearest_table(*row) == Some(table))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|e| matches!(e.value().name(), "th" | "td"))
                .collect()
        })
        .collect();

    for (index, row) in rows.iter().enumerate() {
        if is_header_row(row) {
            // 多期的表格最新一期在最下面，每欄取最後一個有數值的列
            let body: Vec<&Vec<ElementRef>> = rows[index + 1..]
                .iter()
                .take_while(|r| !is_header_row(r))
                .filter(|r| r.iter().any(|c| c.value().name() == "td"))
                .collect();

            for (column, head) in row.iter().enumerate() {
                let latest = body
                    .iter()
                    .rev()
                    .filter_map(|r| r.get(column))
                    .find(|cell| text::find_decimal(&cell.text().collect::<String>()).is_some())
                    .or_else(|| body.first().and_then(|r| r.get(column)));
                if let Some(value) = latest {
                    push_cell(cells, *head, *value);
                }
            }
        }

        for (position, pair) in row.windows(2).enumerate() {
            let (head, value) = (pair[0], pair[1]);
            let is_label = head.value().name() == "th" || position == 0;
            if is_label && value.value().name() == "td" {
                push_cell(cells, head, value);
            }
        }
    }
}

fn is_header_row(row: &[ElementRef]) -> bool {
    !row.is_empty() && row.iter().all(|c| c.value().name() == "th")
}

fn nearest_table(row: ElementRef) -> Option<ElementRef> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
}

fn push_cell(cells: &mut Vec<LabeledCell>, head: ElementRef, value: ElementRef) {
    let label = text::normalize_label(&head.text().collect::<String>());
    if label.is_empty() {
        return;
    }

    let value = text::squash_whitespace(&text::fold_width(&value.text().collect::<String>()));
    cells.push(LabeledCell { label, value });
}

fn page_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut raw = String::new();
    for node in body.descendants() {
        if let Node::Text(text) = node.value() {
            let in_script = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|p| matches!(p.value().name(), "script" | "style" | "noscript"));
            if !in_script {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }

    text::squash_whitespace(&text::fold_width(&raw))
}
