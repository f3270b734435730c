use crate::config::{Config, OutputFormat};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// 支援的來源副檔名（不分大小寫）
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 輸出檔規則：哪些檔案要轉、輸出到哪裡、是否已經轉過
///
/// 輸出路徑為 `<uploads-root>/<format>/<relative-path>`，副檔名換成格式名稱。
/// 所有判斷都是純函式，只有 [`has_artifact`] 會讀取檔案中繼資料。
#[derive(Debug, Clone)]
pub struct ArtifactPolicy {
    uploads_root: PathBuf,
    formats: Vec<OutputFormat>,
}

impl ArtifactPolicy {
    #[must_use]
    pub const fn new(uploads_root: PathBuf, formats: Vec<OutputFormat>) -> Self {
        Self {
            uploads_root,
            formats,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.uploads_root.clone(), config.output_formats.clone())
    }

    #[must_use]
    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    #[must_use]
    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    /// 副檔名符合，且位於上傳資料夾內但不在任何輸出格式子資料夾中
    #[must_use]
    pub fn is_candidate(&self, path: &Path) -> bool {
        if !has_supported_extension(path) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.uploads_root) else {
            return false;
        };
        match relative.components().next() {
            Some(Component::Normal(first)) => !self.formats.iter().any(|f| first == f.as_str()),
            _ => false,
        }
    }

    #[must_use]
    pub fn artifact_path(&self, source: &Path, format: &OutputFormat) -> Option<PathBuf> {
        artifact_path(source, format, &self.uploads_root)
    }

    /// 至少有一種格式尚未產出時需要處理
    #[must_use]
    pub fn needs_processing(&self, source: &Path) -> bool {
        has_supported_extension(source)
            && self.formats.iter().any(|format| {
                self.artifact_path(source, format)
                    .is_some_and(|target| !has_artifact(&target))
            })
    }
}

#[must_use]
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// 來源不在上傳資料夾內時回傳 `None`
#[must_use]
pub fn artifact_path(source: &Path, format: &OutputFormat, uploads_root: &Path) -> Option<PathBuf> {
    let relative = source.strip_prefix(uploads_root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(
        uploads_root
            .join(format.as_str())
            .join(relative)
            .with_extension(format.as_str()),
    )
}

/// 檔案存在且長度大於 0；長度為 0 視為尚未產出
#[must_use]
pub fn has_artifact(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
