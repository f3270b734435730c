//! 圖片轉檔服務元件
//!
//! 監看上傳資料夾，將新的 jpg/png 轉成設定的格式（例如 avif、webp）：
//! A. 全量掃描與即時監看將檔案放入去重佇列
//! B. 轉檔執行緒從佇列取件，判斷是否需要處理
//! C. 在並行額度內呼叫編碼器，成功後清除 CDN 快取

mod artifact_policy;
mod cache_invalidator;
mod codec;
mod main;
mod processor;
mod scanner;
mod watcher;
mod work_key;
mod worker_pool;

pub use artifact_policy::{
    ArtifactPolicy, SUPPORTED_EXTENSIONS, artifact_path, has_artifact, has_supported_extension,
};
pub use cache_invalidator::{
    CacheInvalidator, Cdn77Invalidator, NoopInvalidator, QueuedInvalidator, invalidator_from_config,
};
pub use codec::{ImageCodec, RustImageCodec};
pub use main::ImageConverter;
pub use processor::{ConversionProcessor, FormatOutcome, ProcessReport};
pub use scanner::{FileEnumerator, RescanLoop, ScanOutcome, Scanner, WalkDirEnumerator};
pub use watcher::{UploadWatcher, handle_event};
pub use work_key::{WorkKey, WorkQueue, admit_path};
pub use worker_pool::WorkerPool;
