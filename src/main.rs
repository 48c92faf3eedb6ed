use std::time::Duration;

use anyhow::{Context, Result};
use futures::{stream, Stream};

use crate::{config::App, pipeline::Pipeline, util::http::Fetcher};

#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 指標推算與成交量統計
pub mod calculation;
pub mod config;
/// 資料來源與擷取規則
pub mod crawler;
pub mod declare;
pub mod logging;
pub mod pipeline;
/// 輸出 CSV
pub mod report;
/// 股票代碼清單
pub mod ticker;
pub mod util;

/// 結束前等待日誌寫入的最長時間
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    util::http::install_crypto_provider();

    let result = run().await;
    if let Err(why) = &result {
        logging::error_file_async(format!("Crawler failed because {:?}", why));
    }

    logging::flush(LOG_FLUSH_TIMEOUT);
    result
}

async fn run() -> Result<()> {
    let app = App::get().context("Failed to load configuration")?;
    let all = ticker::load(&app.crawler.tickers_file)?;
    let tickers = ticker::select_range(all, app.crawler.offset, app.crawler.max_tickers);

    logging::info_console(format!(
        "Total tickers to process in this shard: {} (offset {}, max {}, workers {})",
        tickers.len(),
        app.crawler.offset,
        app.crawler.max_tickers,
        app.crawler.workers
    ));

    let fetcher = Fetcher::new(&app.http)?;
    let pipeline = Pipeline::new(&fetcher, &app);
    let records = pipeline.run(&tickers, ctrl_c_signals()).await;

    report::write_file(&app.crawler.output_file, &records)?;

    let message = format!(
        "{} written, {} of {} tickers",
        app.crawler.output_file,
        records.len(),
        tickers.len()
    );
    logging::info_file_async(message.clone());
    logging::info_console(message);

    Ok(())
}

/// 每按一次 Ctrl-C 產生一個項目；無法監聽時結束串流
fn ctrl_c_signals() -> impl Stream<Item = ()> {
    stream::unfold((), |_| async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(((), ())),
            Err(why) => {
                logging::error_file_async(format!("Failed to listen for ctrl-c because {:?}", why));
                None
            }
        }
    })
}
