use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 遞迴列出資料夾下所有檔案，依路徑排序
///
/// 根目錄無法讀取時回傳錯誤；子目錄或單一項目讀取失敗只記錄警告並略過。
pub fn list_files(directory: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(directory)
        .with_context(|| format!("無法讀取資料夾: {}", directory.display()))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!("略過無法讀取的項目: {e}"),
        }
    }

    Ok(files)
}
