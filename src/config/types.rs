use anyhow::{Result, bail};
use console::style;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_UPLOADS_PATH: &str = "/app/uploads";
pub const DEFAULT_OUTPUT_FORMAT: &str = "avif";
pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 200;
/// 轉檔執行緒與並行額度的上限
pub const MAX_WORKER_COUNT: usize = 1024;

/// 輸出格式名稱，同時作為輸出子資料夾名稱與副檔名
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputFormat(String);

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            bail!("輸出格式不可為空");
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("輸出格式名稱只能包含英數字: {name}");
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CDN77 憑證，API key 與 cache id 都存在時才會建立
#[derive(Clone, PartialEq, Eq)]
pub struct CdnCredentials {
    pub api_key: String,
    pub cache_id: String,
}

impl CdnCredentials {
    #[must_use]
    pub fn from_parts(api_key: Option<String>, cache_id: Option<String>) -> Option<Self> {
        let api_key = api_key.filter(|v| !v.trim().is_empty())?;
        let cache_id = cache_id.filter(|v| !v.trim().is_empty())?;
        Some(Self {
            api_key: api_key.trim().to_string(),
            cache_id: cache_id.trim().to_string(),
        })
    }
}

impl fmt::Debug for CdnCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnCredentials")
            .field("api_key", &"***")
            .field("cache_id", &self.cache_id)
            .finish()
    }
}

/// `settings.json` 的內容，所有欄位皆為選填
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub uploads_path: Option<PathBuf>,
    pub output_formats: Option<Vec<String>>,
    pub max_concurrency: Option<usize>,
    pub worker_count: Option<usize>,
    pub rescan_interval_secs: Option<u64>,
    pub cdn77_api_key: Option<String>,
    pub cdn77_cache_id: Option<String>,
    pub debug: Option<bool>,
}

/// 服務設定，啟動時建立一次後傳入各元件
#[derive(Debug, Clone)]
pub struct Config {
    /// 上傳資料夾根目錄（絕對路徑）
    pub uploads_root: PathBuf,
    /// 依設定順序排列的輸出格式
    pub output_formats: Vec<OutputFormat>,
    /// 同時進行的轉檔上限
    pub max_concurrency: usize,
    /// 從佇列取件的執行緒數
    pub worker_count: usize,
    pub rescan_interval: Duration,
    pub cdn: Option<CdnCredentials>,
    pub debug: bool,
}

impl Config {
    pub fn print_configuration(&self) {
        let formats: Vec<&str> = self.output_formats.iter().map(OutputFormat::as_str).collect();
        println!("{}", style("=== 設定 ===").cyan().bold());
        println!("  UploadsPath: {}", self.uploads_root.display());
        println!("  OutputFormats: {}", formats.join(","));
        println!("  MaxConcurrency: {}", self.max_concurrency);
        println!("  WorkerCount: {}", self.worker_count);
        println!("  RescanInterval: {}s", self.rescan_interval.as_secs());
        match &self.cdn {
            Some(cdn) => println!("  Cdn77: cache {} (api key ***)", cdn.cache_id),
            None => println!("  Cdn77: {}", style("未設定").dim()),
        }
        println!("  Debug: {}", self.debug);
    }
}
