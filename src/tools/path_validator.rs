use anyhow::{Context, Result, bail};
use std::path::{Component, Path, PathBuf};

pub fn validate_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("路徑不存在: {}", path.display());
    }
    if !path.is_dir() {
        bail!("路徑不是資料夾: {}", path.display());
    }
    Ok(())
}

pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("無法建立資料夾: {}", path.display()))?;
    }
    Ok(())
}

/// 確保檔案的上層資料夾存在
pub fn ensure_parent_exists(file: &Path) -> Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory_exists(parent),
        _ => Ok(()),
    }
}

/// 以字面方式移除 `.` 與 `..`，不解析符號連結
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(validate_directory_exists(temp_dir.path()).is_ok());
        assert!(validate_directory_exists(&file).is_err());
        assert!(validate_directory_exists(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/uploads/./2024/../a.jpg")),
            PathBuf::from("/uploads/a.jpg")
        );
        assert_eq!(
            normalize_path(Path::new("/uploads/dir/")),
            PathBuf::from("/uploads/dir")
        );
    }

    #[test]
    fn test_ensure_parent_exists_creates_tree() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("avif").join("2024").join("a.avif");

        ensure_parent_exists(&file).unwrap();

        assert!(temp_dir.path().join("avif").join("2024").is_dir());
        assert!(!file.exists());
    }
}
