//! 工具模块
pub mod log_format;

pub use self::log_format::{compress_pattern_list, preview_compact};
