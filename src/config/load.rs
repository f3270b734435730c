use crate::config::types::{
    CdnCredentials, Config, DEFAULT_OUTPUT_FORMAT, DEFAULT_RESCAN_INTERVAL_SECS,
    DEFAULT_UPLOADS_PATH, FileSettings, MAX_WORKER_COUNT, OutputFormat, SETTINGS_FILE,
};
use crate::tools::normalize_path;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};
use sysinfo::System;

impl Config {
    /// 依序套用預設值、`settings.json`、環境變數與 `--debug` 參數
    pub fn new() -> Result<Self> {
        let settings = Self::load_settings(Path::new(SETTINGS_FILE))?;
        let args: Vec<String> = env::args().collect();
        Self::resolve(&settings, |name| env::var(name).ok(), &args)
    }

    pub fn load_settings(path: &Path) -> Result<FileSettings> {
        if !path.exists() {
            return Ok(FileSettings::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    pub fn resolve<F>(settings: &FileSettings, lookup: F, args: &[String]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uploads_path = lookup("UPLOADS_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.uploads_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_PATH));
        let uploads_root = std::path::absolute(&uploads_path)
            .map(|p| normalize_path(&p))
            .with_context(|| format!("無效的上傳路徑: {}", uploads_path.display()))?;

        let output_formats = match lookup("OUTPUT_FORMATS") {
            Some(raw) => parse_formats(raw.split(','))?,
            None => match &settings.output_formats {
                Some(names) => parse_formats(names.iter().map(String::as_str))?,
                None => vec![OutputFormat::parse(DEFAULT_OUTPUT_FORMAT)?],
            },
        };

        let max_concurrency = match parse_var::<usize>(&lookup, "MAX_CONCURRENCY")? {
            Some(value) => value,
            None => settings
                .max_concurrency
                .unwrap_or_else(default_max_concurrency),
        };
        if max_concurrency == 0 {
            bail!("MAX_CONCURRENCY 必須大於 0");
        }
        if max_concurrency > MAX_WORKER_COUNT {
            bail!("MAX_CONCURRENCY 不可超過 {MAX_WORKER_COUNT}");
        }

        let worker_count = match parse_var::<usize>(&lookup, "WORKER_COUNT")? {
            Some(value) => value,
            None => settings
                .worker_count
                .unwrap_or_else(|| max_concurrency.saturating_mul(2).min(MAX_WORKER_COUNT)),
        };
        if worker_count == 0 {
            bail!("WORKER_COUNT 必須大於 0");
        }
        if worker_count > MAX_WORKER_COUNT {
            bail!("WORKER_COUNT 不可超過 {MAX_WORKER_COUNT}");
        }

        let rescan_secs = match parse_var::<u64>(&lookup, "RESCAN_INTERVAL_SECS")? {
            Some(value) => value,
            None => settings
                .rescan_interval_secs
                .unwrap_or(DEFAULT_RESCAN_INTERVAL_SECS),
        };
        if rescan_secs == 0 {
            bail!("RESCAN_INTERVAL_SECS 必須大於 0");
        }

        let cdn = CdnCredentials::from_parts(
            lookup("CDN77_API_KEY").or_else(|| settings.cdn77_api_key.clone()),
            lookup("CDN77_CACHE_ID").or_else(|| settings.cdn77_cache_id.clone()),
        );

        let debug = lookup("DEBUG").map_or(settings.debug.unwrap_or(false), |v| {
            v.trim().eq_ignore_ascii_case("true")
        }) || args.iter().any(|arg| arg == "--debug");

        Ok(Self {
            uploads_root,
            output_formats,
            max_concurrency,
            worker_count,
            rescan_interval: Duration::from_secs(rescan_secs),
            cdn,
            debug,
        })
    }
}

/// 解析格式清單：去除空白與空項目，保留第一次出現的順序
fn parse_formats<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<OutputFormat>> {
    let mut formats: Vec<OutputFormat> = Vec::new();
    for name in names.filter(|n| !n.trim().is_empty()) {
        let format = OutputFormat::parse(name)?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        bail!("至少需要一種輸出格式");
    }
    Ok(formats)
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("無法解析環境變數 {name}: {v}"))
        })
        .transpose()
}

fn default_max_concurrency() -> usize {
    let mut system = System::new();
    system.refresh_cpu_all();
    system.cpus().len().clamp(1, MAX_WORKER_COUNT)
}
