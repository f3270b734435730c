use crate::config::OutputFormat;
use anyhow::{Context, Result, bail};
use image::{DynamicImage, ImageFormat};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// 影像編碼器：讀取來源檔並在目標路徑寫出指定格式
pub trait ImageCodec: Send + Sync {
    fn convert(&self, source: &Path, target: &Path, format: &OutputFormat) -> Result<()>;
}

/// 使用 `image` crate 的純 Rust 編碼器
#[derive(Debug, Default, Clone, Copy)]
pub struct RustImageCodec;

impl RustImageCodec {
    pub fn image_format(format: &OutputFormat) -> Result<ImageFormat> {
        Ok(match format.as_str() {
            "avif" => ImageFormat::Avif,
            "webp" => ImageFormat::WebP,
            "png" => ImageFormat::Png,
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            other => bail!("不支援的輸出格式: {other}"),
        })
    }

    // webp 編碼器只接受 8-bit，jpeg 不支援 alpha
    fn prepare(image: DynamicImage, format: ImageFormat) -> DynamicImage {
        match format {
            ImageFormat::Png => image,
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
            _ => DynamicImage::ImageRgba8(image.to_rgba8()),
        }
    }
}

impl ImageCodec for RustImageCodec {
    fn convert(&self, source: &Path, target: &Path, format: &OutputFormat) -> Result<()> {
        let image_format = Self::image_format(format)?;
        let image = image::open(source)
            .with_context(|| format!("無法讀取圖片: {}", source.display()))?;
        let image = Self::prepare(image, image_format);

        let mut partial = partial_file(target)?;
        {
            let mut writer = BufWriter::new(partial.as_file_mut());
            image
                .write_to(&mut writer, image_format)
                .with_context(|| format!("無法編碼 {format}: {}", source.display()))?;
            writer
                .flush()
                .with_context(|| format!("無法寫入暫存檔: {}", target.display()))?;
        }

        // 失敗時暫存檔隨 drop 刪除
        partial
            .persist(target)
            .with_context(|| format!("無法寫入輸出檔案: {}", target.display()))?;
        Ok(())
    }
}

/// 與目標同資料夾的隱藏暫存檔 `.<name>.XXXXXX.partial`，每次寫入各自一個
fn partial_file(target: &Path) -> Result<NamedTempFile> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".partial")
        .tempfile_in(parent)
        .with_context(|| format!("無法建立暫存檔: {}", parent.display()))
}
