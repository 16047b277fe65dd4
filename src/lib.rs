//! rspagemod - 按URL规则向文档注入内容脚本的页面修改引擎

// 导出全局错误类型
pub use self::error::{PageModError, PatternError, PmResult};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, ManagerConfig};

// 导出编译模块核心接口
pub use self::compiler::{Matcher, RuleCompiler};

// 导出规则模块核心接口
pub use self::rule::{
    ContentScript, Include, InjectionTiming, PageModDefinition, PageModOptions, RuleRegistry,
};

// 导出宿主协作接口
pub use self::host::{
    Document, DocumentId, HostEvent, HostEvents, MemoryHost, RecordingSandbox, Sandbox,
    SandboxHandle, SandboxRequest, ScriptError, UrlInfo,
};

// 导出 PageMod 及其事件
pub use self::page_mod::{AttachEvent, ErrorEvent, ListenerId, ModId, PageMod};

// 导出分发模块核心接口（含全局单例接口）
pub use self::dispatcher::{
    PageModManager,
    init_global_manager,
    create_mod,
    register_mod,
    unregister_mod,
    shutdown_global_manager,
    with_global_manager,
};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod compiler;
pub mod rule;
pub mod host;
pub mod page_mod;
pub mod dispatcher;
pub mod utils;
