use super::processor::ConversionProcessor;
use super::work_key::WorkQueue;
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 固定數量的轉檔執行緒，共用同一個並行額度從佇列取件
pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        queue: Arc<WorkQueue>,
        processor: Arc<ConversionProcessor>,
        worker_count: usize,
    ) -> Result<Self> {
        let mut pool = Self {
            queue: Arc::clone(&queue),
            handles: Vec::new(),
        };

        for index in 0..worker_count.max(1) {
            let queue = Arc::clone(&queue);
            let processor = Arc::clone(&processor);
            let spawned = thread::Builder::new()
                .name(format!("converter-{index}"))
                .spawn(move || drain(&queue, &processor))
                .context("無法啟動轉檔執行緒");

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(e);
                }
            }
        }

        info!(
            "啟動 {} 個轉檔執行緒，同時轉檔上限 {}",
            pool.handles.len(),
            processor.budget().capacity()
        );
        Ok(pool)
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// 停止接受新工作，處理完佇列剩餘項目後結束所有執行緒
    pub fn shutdown(self) {
        self.queue.complete();
        for handle in self.handles {
            if handle.join().is_err() {
                error!("轉檔執行緒異常結束");
            }
        }
        info!("所有轉檔執行緒已結束");
    }
}

fn drain(queue: &WorkQueue, processor: &ConversionProcessor) {
    while let Some(key) = queue.take() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(&key)));
        if result.is_err() {
            error!("處理 {key} 時發生未預期的錯誤");
        }
    }
    debug!("佇列已關閉，執行緒結束");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::image_converter::{
        ArtifactPolicy, ImageCodec, NoopInvalidator, WorkKey,
    };
    use crate::config::OutputFormat;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct PanickyCodec {
        calls: AtomicUsize,
    }

    impl ImageCodec for PanickyCodec {
        fn convert(&self, source: &Path, target: &Path, _format: &OutputFormat) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source.ends_with("bad.jpg") {
                panic!("decoder bug");
            }
            fs::write(target, b"ok")?;
            Ok(())
        }
    }

    #[test]
    fn test_shutdown_drains_queue_and_survives_panics() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["bad.jpg", "good1.jpg", "good2.jpg"] {
            fs::write(root.join(name), b"x").unwrap();
        }

        let policy = Arc::new(ArtifactPolicy::new(
            root.to_path_buf(),
            vec![OutputFormat::parse("webp").unwrap()],
        ));
        let codec = Arc::new(PanickyCodec {
            calls: AtomicUsize::new(0),
        });
        let processor = Arc::new(ConversionProcessor::new(
            policy,
            codec.clone(),
            Arc::new(NoopInvalidator),
            1,
        ));
        let queue = Arc::new(WorkQueue::new());
        for name in ["bad.jpg", "good1.jpg", "good2.jpg"] {
            queue.try_admit(WorkKey::new(&root.join(name)).unwrap());
        }

        let pool = WorkerPool::start(Arc::clone(&queue), Arc::clone(&processor), 1).unwrap();
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown();

        assert_eq!(codec.calls.load(Ordering::SeqCst), 3);
        assert!(root.join("webp").join("good1.webp").exists());
        assert!(root.join("webp").join("good2.webp").exists());
        assert_eq!(processor.budget().available(), 1);
        assert!(queue.is_empty());
    }
}
