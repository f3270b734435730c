use crate::tools::{DedupQueue, normalize_path};
use anyhow::{Context, Result};
use log::{trace, warn};
use std::fmt;
use std::path::{Path, PathBuf};

/// 佇列中的工作識別：正規化後的絕對路徑
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkKey(PathBuf);

pub type WorkQueue = DedupQueue<WorkKey>;

impl WorkKey {
    pub fn new(path: &Path) -> Result<Self> {
        let absolute = std::path::absolute(path)
            .with_context(|| format!("無法取得絕對路徑: {}", path.display()))?;
        Ok(Self(normalize_path(&absolute)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// 將路徑加入佇列，掃描與即時通知共用
pub fn admit_path(queue: &WorkQueue, path: &Path) -> bool {
    let key = match WorkKey::new(path) {
        Ok(key) => key,
        Err(e) => {
            warn!("略過無效路徑 {}: {e:#}", path.display());
            return false;
        }
    };

    let admitted = queue.try_admit(key);
    if !admitted {
        trace!("已在佇列中: {}", path.display());
    }
    admitted
}
