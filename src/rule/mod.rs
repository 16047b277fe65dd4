//! 规则模块：PageMod 选项模型与规则注册表
pub mod model;
pub mod registry;

// 导出核心接口
pub use self::model::{ContentScript, Include, InjectionTiming, PageModDefinition, PageModOptions};
pub use self::registry::{RuleAddedListener, RuleCallback, RuleRegistry};
