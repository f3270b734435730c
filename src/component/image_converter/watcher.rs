use super::artifact_policy::ArtifactPolicy;
use super::work_key::{WorkQueue, admit_path};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 即時監看上傳資料夾，新檔案直接加入佇列
pub struct UploadWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl UploadWatcher {
    pub fn start(policy: Arc<ArtifactPolicy>, queue: Arc<WorkQueue>) -> Result<Self> {
        let root = policy.uploads_root().to_path_buf();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    handle_event(&event, &policy, &queue);
                }
                Err(e) => error!("檔案監看錯誤: {e}"),
            },
        )
        .context("無法建立檔案監看器")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("無法監看資料夾: {}", root.display()))?;
        info!("開始監看資料夾: {}", root.display());

        Ok(Self { watcher, root })
    }

    pub fn stop(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.root) {
            warn!("取消監看失敗 {}: {e}", self.root.display());
        }
        info!("停止監看資料夾: {}", self.root.display());
    }
}

/// 處理一個檔案系統事件，回傳加入佇列的數量
///
/// 寫入中的檔案不會因資料變更事件入列：建立時已有內容、寫入後關閉、或改名進入
/// 上傳資料夾才算完成。刪除事件只記錄，不會取消佇列中或處理中的工作。
pub fn handle_event(event: &Event, policy: &ArtifactPolicy, queue: &WorkQueue) -> usize {
    match event.kind {
        EventKind::Create(_) => admit_paths(event, policy, queue, |path| {
            // 上傳剛開檔時大小為 0，等關閉事件再處理
            path.metadata().is_ok_and(|meta| meta.len() > 0)
        }),
        EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            admit_paths(event, policy, queue, |_| true)
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                info!("檔案已刪除: {}", path.display());
            }
            0
        }
        _ => 0,
    }
}

fn admit_paths(
    event: &Event,
    policy: &ArtifactPolicy,
    queue: &WorkQueue,
    ready: impl Fn(&Path) -> bool,
) -> usize {
    event
        .paths
        .iter()
        .filter(|path| is_live_candidate(path, policy) && ready(path))
        .filter(|path| {
            let admitted = admit_path(queue, path);
            if admitted {
                debug!("新檔案加入佇列: {}", path.display());
            }
            admitted
        })
        .count()
}

// 改名事件的來源路徑已不存在，需要確認仍是一般檔案
fn is_live_candidate(path: &Path, policy: &ArtifactPolicy) -> bool {
    policy.is_candidate(path) && path.is_file()
}
