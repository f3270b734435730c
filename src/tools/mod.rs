mod concurrency_budget;
mod dedup_queue;
mod file_scanner;
mod path_validator;

pub use concurrency_budget::{BudgetPermit, ConcurrencyBudget};
pub use dedup_queue::DedupQueue;
pub use file_scanner::list_files;
pub use path_validator::{
    ensure_directory_exists, ensure_parent_exists, normalize_path, validate_directory_exists,
};
