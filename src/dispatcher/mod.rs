//! 分发模块：文档事件到 PageMod 的分发
pub mod global;
pub mod manager;

// 导出核心接口
pub use self::global::{
    create_mod, init_global_manager, register_mod, shutdown_global_manager, unregister_mod,
    with_global_manager,
};
pub use self::manager::PageModManager;
