//! 功能元件模組

pub mod image_converter;

pub use image_converter::ImageConverter;
