use std::{
    thread,
    time::{Duration, Instant},
};

use chrono::{format::DelayedFormat, Local};
use concat_string::concat_string;
use crossbeam_channel::{bounded, unbounded, Sender};
use once_cell::sync::Lazy;

use crate::logging::rotate::Rotate;

pub mod rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("crawler"));

/// 單次寫入檔案的批次大小
const BATCH_SIZE: usize = 4096;

/// 寫檔線程收到的訊息
enum Entry {
    Line(String),
    /// 寫出目前累積的內容後回覆
    Flush(Sender<()>),
}

pub struct Logger {
    info_writer: Sender<Entry>,
    warn_writer: Sender<Entry>,
    error_writer: Sender<Entry>,
    debug_writer: Sender<Entry>,
}

impl Logger {
    fn new(log_name: &str) -> Self {
        Logger {
            info_writer: Self::create_writer(format!("{}_info", log_name)),
            warn_writer: Self::create_writer(format!("{}_warn", log_name)),
            error_writer: Self::create_writer(format!("{}_error", log_name)),
            debug_writer: Self::create_writer(format!("{}_debug", log_name)),
        }
    }

    fn info(&self, log: String) {
        self.send(log, &self.info_writer);
    }

    fn warn(&self, log: String) {
        self.send(log, &self.warn_writer);
    }

    fn error(&self, log: String) {
        self.send(log, &self.error_writer);
    }

    fn debug(&self, log: String) {
        self.send(log, &self.debug_writer);
    }

    fn send(&self, msg: String, writer: &Sender<Entry>) {
        if let Err(why) = writer.send(Entry::Line(msg)) {
            error_console(why.to_string());
        }
    }

    fn writers(&self) -> [&Sender<Entry>; 4] {
        [
            &self.info_writer,
            &self.warn_writer,
            &self.error_writer,
            &self.debug_writer,
        ]
    }

    /// 要求每個寫檔線程寫出已排隊的內容，在期限內等待回覆；回傳是否全部完成
    fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (ack_tx, ack_rx) = bounded::<()>(4);
        let mut pending = 0;

        for writer in self.writers() {
            if writer.send(Entry::Flush(ack_tx.clone())).is_ok() {
                pending += 1;
            }
        }

        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if ack_rx.recv_timeout(remaining).is_err() {
                error_console(format!("{} log writers did not flush in time", pending));
                return false;
            }
            pending -= 1;
        }

        true
    }

    fn create_writer(log_name: String) -> Sender<Entry> {
        let (tx, rx) = unbounded::<Entry>();

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut rotate = Rotate::new(concat_string!("log/%Y-%m-%d_", log_name, ".log"));
            let mut lines = String::with_capacity(BATCH_SIZE);

            for received in &rx {
                let now = Local::now();
                let ack = match received {
                    Entry::Line(msg) => {
                        lines.push_str(&concat_string!(
                            now.format("%F %X%.6f").to_string(),
                            " ",
                            msg,
                            "\r\n"
                        ));
                        None
                    }
                    Entry::Flush(ack) => Some(ack),
                };

                let should_write = ack.is_some() || rx.is_empty() || lines.len() >= BATCH_SIZE;
                if should_write && !lines.is_empty() {
                    if let Err(why) = rotate.write_msg(now, lines.as_bytes()) {
                        error_console(format!(
                            "Failed to write to log file. because:{:#?}\r\nmsg:{}",
                            why, lines
                        ));
                    }

                    rotate.flush();
                    lines.clear();
                }

                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        });

        tx
    }
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

/// 結束程式前呼叫，確保已送出的紀錄都寫進檔案
pub fn flush(timeout: Duration) -> bool {
    LOGGER.flush(timeout)
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_flush_writes_queued_lines() {
        let marker = format!("flush marker {}", Local::now().timestamp_nanos_opt().unwrap_or_default());
        info_file_async(marker.clone());
        assert!(flush(Duration::from_secs(5)));

        let path = Local::now().format("log/%Y-%m-%d_crawler_info.log").to_string();
        let written = fs::read_to_string(path).unwrap();
        assert!(written.contains(&marker));
    }
}
