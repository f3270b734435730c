use crate::config::{CdnCredentials, Config};
use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use reqwest::blocking::Client;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CDN77_API_BASE: &str = "https://api.cdn77.com/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 在輸出檔寫入成功後清除 CDN 快取
pub trait CacheInvalidator: Send + Sync {
    fn purge(&self, artifact: &Path) -> Result<()>;
}

/// 未設定憑證時使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn purge(&self, _artifact: &Path) -> Result<()> {
        Ok(())
    }
}

pub struct Cdn77Invalidator {
    client: Client,
    endpoint: String,
    api_key: String,
    uploads_root: PathBuf,
}

impl Cdn77Invalidator {
    pub fn new(credentials: &CdnCredentials, uploads_root: &Path) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("無法建立 HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{CDN77_API_BASE}/cdn/{}/job/purge", credentials.cache_id),
            api_key: credentials.api_key.clone(),
            uploads_root: uploads_root.to_path_buf(),
        })
    }

    #[cfg(test)]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// CDN 上的路徑：相對於上傳資料夾並以 `/` 開頭
    #[must_use]
    pub fn purge_path(&self, artifact: &Path) -> Option<String> {
        let relative = artifact.strip_prefix(&self.uploads_root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() {
            return None;
        }
        Some(format!("/{}", segments.join("/")))
    }
}

impl CacheInvalidator for Cdn77Invalidator {
    fn purge(&self, artifact: &Path) -> Result<()> {
        let Some(path) = self.purge_path(artifact) else {
            bail!("輸出檔不在上傳資料夾內: {}", artifact.display());
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "paths": [path] }))
            .send()
            .with_context(|| format!("CDN purge 請求失敗: {path}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("CDN purge 回應 {status}: {path}");
        }

        info!("[CDN 清除] {path}");
        Ok(())
    }
}

/// 把清除請求交給背景執行緒，`purge` 不等待 CDN 回應
///
/// 失敗只記錄警告。drop 時會先送完佇列中的請求再結束執行緒。
pub struct QueuedInvalidator {
    sender: Option<Sender<PathBuf>>,
    handle: Option<JoinHandle<()>>,
}

impl QueuedInvalidator {
    pub fn spawn(inner: Arc<dyn CacheInvalidator>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<PathBuf>();
        let handle = thread::Builder::new()
            .name("cdn-purge".to_string())
            .spawn(move || {
                while let Ok(artifact) = receiver.recv() {
                    if let Err(e) = inner.purge(&artifact) {
                        warn!("CDN 快取清除失敗 {}: {e:#}", artifact.display());
                    }
                }
                debug!("CDN 清除執行緒結束");
            })
            .context("無法啟動 CDN 清除執行緒")?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl CacheInvalidator for QueuedInvalidator {
    fn purge(&self, artifact: &Path) -> Result<()> {
        let Some(sender) = &self.sender else {
            bail!("CDN 清除執行緒已停止");
        };
        sender
            .send(artifact.to_path_buf())
            .map_err(|_| anyhow::anyhow!("CDN 清除執行緒已停止"))
    }
}

impl Drop for QueuedInvalidator {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("CDN 清除執行緒異常結束");
            }
        }
    }
}

/// 依設定選擇實作，沒有憑證時不清除快取
pub fn invalidator_from_config(config: &Config) -> Result<Arc<dyn CacheInvalidator>> {
    Ok(match &config.cdn {
        Some(credentials) => {
            let cdn77 = Cdn77Invalidator::new(credentials, &config.uploads_root)?;
            Arc::new(QueuedInvalidator::spawn(Arc::new(cdn77))?)
        }
        None => Arc::new(NoopInvalidator),
    })
}
