use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use strum::IntoEnumIterator;

use crate::declare::{Metric, MetricRecord};

/// 輸出的小數位數
const DECIMAL_PLACES: u32 = 4;

/// 將紀錄寫成 CSV，取不到的欄位留空
pub fn write_csv<W: Write>(writer: W, records: &[MetricRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["code".to_string()];
    header.extend(Metric::iter().map(|m| m.to_string()));
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![record.code.to_string()];
        row.extend(Metric::iter().map(|m| format_value(record.get(m))));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// 寫入檔案，既有檔案會被覆蓋
pub fn write_file<P: AsRef<Path>>(path: P, records: &[MetricRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(file, records).with_context(|| format!("Failed to write {}", path.display()))
}

fn format_value(value: Option<Decimal>) -> String {
    value
        .map(|v| v.round_dp(DECIMAL_PLACES).normalize().to_string())
        .unwrap_or_default()
}
