use super::artifact_policy::ArtifactPolicy;
use super::cache_invalidator::{CacheInvalidator, invalidator_from_config};
use super::codec::{ImageCodec, RustImageCodec};
use super::processor::ConversionProcessor;
use super::scanner::{RescanLoop, Scanner};
use super::watcher::UploadWatcher;
use super::work_key::WorkQueue;
use super::worker_pool::WorkerPool;
use crate::config::Config;
use crate::tools::validate_directory_exists;
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 圖片轉檔服務
///
/// 掃描與即時監看把檔案放進去重佇列，轉檔執行緒從佇列取件處理，
/// 兩邊只透過佇列溝通。
pub struct ImageConverter {
    config: Config,
    policy: Arc<ArtifactPolicy>,
    queue: Arc<WorkQueue>,
    processor: Arc<ConversionProcessor>,
}

impl ImageConverter {
    #[must_use]
    pub fn new(
        config: Config,
        codec: Arc<dyn ImageCodec>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        let policy = Arc::new(ArtifactPolicy::from_config(&config));
        let processor = Arc::new(ConversionProcessor::new(
            Arc::clone(&policy),
            codec,
            invalidator,
            config.max_concurrency,
        ));

        Self {
            config,
            policy,
            queue: Arc::new(WorkQueue::new()),
            processor,
        }
    }

    /// 使用 `image` 編碼器，並依憑證決定是否清除 CDN 快取
    pub fn with_defaults(config: Config) -> Result<Self> {
        let invalidator = invalidator_from_config(&config)?;
        Ok(Self::new(config, Arc::new(RustImageCodec), invalidator))
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<ArtifactPolicy> {
        &self.policy
    }

    /// 執行到 `shutdown_signal` 被設定為止
    ///
    /// 停止順序：監看、定期掃描、關閉佇列並等待轉檔執行緒處理完剩餘項目。
    pub fn run(&self, shutdown_signal: &Arc<AtomicBool>) -> Result<()> {
        validate_directory_exists(self.policy.uploads_root())?;

        let pool = WorkerPool::start(
            Arc::clone(&self.queue),
            Arc::clone(&self.processor),
            self.config.worker_count,
        )?;

        let watcher = match UploadWatcher::start(Arc::clone(&self.policy), Arc::clone(&self.queue)) {
            Ok(watcher) => watcher,
            Err(e) => {
                pool.shutdown();
                return Err(e);
            }
        };

        let scanner = Arc::new(Scanner::new(
            Arc::clone(&self.policy),
            Arc::clone(&self.queue),
        ));
        let rescan = match RescanLoop::spawn(scanner, self.config.rescan_interval) {
            Ok(rescan) => rescan,
            Err(e) => {
                watcher.stop();
                pool.shutdown();
                return Err(e);
            }
        };

        info!("服務已啟動: {}", self.policy.uploads_root().display());

        while !shutdown_signal.load(Ordering::SeqCst) {
            thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }

        warn!("收到中斷信號，正在停止服務...");
        watcher.stop();
        rescan.stop();
        if !self.queue.is_empty() {
            info!("等待佇列中剩餘 {} 個檔案處理完成", self.queue.len());
        }
        pool.shutdown();

        info!("服務已停止");
        Ok(())
    }
}
