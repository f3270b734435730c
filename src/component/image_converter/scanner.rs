use super::artifact_policy::ArtifactPolicy;
use super::work_key::{WorkQueue, admit_path};
use crate::tools::list_files;
use anyhow::{Context, Result};
use log::{error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 列出資料夾下所有檔案
pub trait FileEnumerator: Send + Sync {
    fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WalkDirEnumerator;

impl FileEnumerator for WalkDirEnumerator {
    fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>> {
        list_files(root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed {
        seen: usize,
        candidates: usize,
        admitted: usize,
    },
    /// 列舉失敗，已記錄錯誤
    Failed,
    /// 上一次掃描尚未結束
    Skipped,
}

/// 全量掃描：將上傳資料夾中所有候選檔案加入佇列
///
/// 同一時間只會有一次掃描在執行，重疊的觸發直接略過。
pub struct Scanner {
    policy: Arc<ArtifactPolicy>,
    queue: Arc<WorkQueue>,
    enumerator: Box<dyn FileEnumerator>,
    scanning: AtomicBool,
}

impl Scanner {
    #[must_use]
    pub fn new(policy: Arc<ArtifactPolicy>, queue: Arc<WorkQueue>) -> Self {
        Self::with_enumerator(policy, queue, Box::new(WalkDirEnumerator))
    }

    #[must_use]
    pub fn with_enumerator(
        policy: Arc<ArtifactPolicy>,
        queue: Arc<WorkQueue>,
        enumerator: Box<dyn FileEnumerator>,
    ) -> Self {
        Self {
            policy,
            queue,
            enumerator,
            scanning: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub fn scan(&self) -> ScanOutcome {
        let Some(_guard) = ScanGuard::try_acquire(&self.scanning) else {
            info!("掃描仍在進行中，略過本次觸發");
            return ScanOutcome::Skipped;
        };

        let root = self.policy.uploads_root();
        info!("開始掃描資料夾: {}", root.display());
        let started = Instant::now();

        let files = match self.enumerator.enumerate(root) {
            Ok(files) => files,
            Err(e) => {
                error!("掃描資料夾失敗 {}: {e:#}", root.display());
                return ScanOutcome::Failed;
            }
        };

        let candidates: Vec<&PathBuf> = files
            .par_iter()
            .filter(|path| self.policy.is_candidate(path))
            .collect();
        let admitted = candidates
            .iter()
            .filter(|path| admit_path(&self.queue, path))
            .count();

        info!(
            "掃描完成: {} 個檔案, {} 個候選, {} 個加入佇列 ({}ms)",
            files.len(),
            candidates.len(),
            admitted,
            started.elapsed().as_millis()
        );

        ScanOutcome::Completed {
            seen: files.len(),
            candidates: candidates.len(),
            admitted,
        }
    }
}

/// 掃描旗標，drop 時清除（包含提早 return 與 panic）
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ScanGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 定期重新掃描，補回遺漏或被合併的檔案系統事件
pub struct RescanLoop {
    stop_signal: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl RescanLoop {
    /// 立即掃描一次，之後每隔 `interval` 再掃描
    pub fn spawn(scanner: Arc<Scanner>, interval: Duration) -> Result<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);

        let handle = thread::Builder::new()
            .name("rescan".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    scanner.scan();
                    if !wait_for(interval, &stop) {
                        break;
                    }
                }
            })
            .context("無法啟動掃描執行緒")?;

        Ok(Self {
            stop_signal,
            handle,
        })
    }

    /// 停止排程並等待進行中的掃描結束
    pub fn stop(self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            warn!("掃描執行緒異常結束");
        }
    }
}

/// 等待指定時間，收到停止訊號時回傳 false
fn wait_for(interval: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn scanner_for(root: &Path) -> (Scanner, Arc<WorkQueue>) {
        let policy = Arc::new(ArtifactPolicy::new(
            root.to_path_buf(),
            vec![OutputFormat::parse("avif").unwrap()],
        ));
        let queue = Arc::new(WorkQueue::new());
        (Scanner::new(policy, Arc::clone(&queue)), queue)
    }

    #[test]
    fn test_scan_admits_candidates_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("avif")).unwrap();
        fs::create_dir_all(root.join("2024")).unwrap();
        fs::write(root.join("a.jpg"), b"x").unwrap();
        fs::write(root.join("2024").join("b.PNG"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("avif").join("a.avif"), b"x").unwrap();
        fs::write(root.join("avif").join("stray.jpg"), b"x").unwrap();

        let (scanner, queue) = scanner_for(root);
        let outcome = scanner.scan();

        assert_eq!(
            outcome,
            ScanOutcome::Completed {
                seen: 5,
                candidates: 2,
                admitted: 2
            }
        );
        assert_eq!(queue.len(), 2);
        assert!(!scanner.is_scanning());
    }

    #[test]
    fn test_rescan_does_not_duplicate_pending_work() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"x").unwrap();

        let (scanner, queue) = scanner_for(temp_dir.path());
        scanner.scan();
        let second = scanner.scan();

        assert!(matches!(second, ScanOutcome::Completed { admitted: 0, .. }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_failed_scan_clears_flag() {
        let temp_dir = TempDir::new().unwrap();
        let (scanner, queue) = scanner_for(&temp_dir.path().join("missing"));

        assert_eq!(scanner.scan(), ScanOutcome::Failed);
        assert!(!scanner.is_scanning());
        assert_eq!(scanner.scan(), ScanOutcome::Failed);
        assert!(queue.is_empty());
    }

    struct CountingEnumerator {
        calls: Arc<Mutex<usize>>,
    }

    impl FileEnumerator for CountingEnumerator {
        fn enumerate(&self, _root: &Path) -> Result<Vec<PathBuf>> {
            *self.calls.lock().unwrap() += 1;
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_rescan_loop_scans_immediately_and_stops() {
        let calls = Arc::new(Mutex::new(0));
        let policy = Arc::new(ArtifactPolicy::new(PathBuf::from("/uploads"), Vec::new()));
        let scanner = Arc::new(Scanner::with_enumerator(
            policy,
            Arc::new(WorkQueue::new()),
            Box::new(CountingEnumerator {
                calls: Arc::clone(&calls),
            }),
        ));

        let rescan = RescanLoop::spawn(scanner, Duration::from_secs(3600)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while *calls.lock().unwrap() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        rescan.stop();

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_wait_for_returns_early_on_stop() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!wait_for(Duration::from_secs(60), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));

        let running = AtomicBool::new(false);
        assert!(wait_for(Duration::from_millis(10), &running));
    }
}
