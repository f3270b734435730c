use env_logger::Env;

/// 初始化 logger；debug 模式下本 crate 輸出 trace，`RUST_LOG` 優先
pub fn init(debug: bool) {
    let default_filter = if debug {
        "info,upload_image_converter=trace"
    } else {
        "info"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}
