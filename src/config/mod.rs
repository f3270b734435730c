pub mod load;
pub mod types;

pub use types::{CdnCredentials, Config, FileSettings, OutputFormat};
