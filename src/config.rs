//! 全局配置管理,存储所有可配置项

use crate::rule::InjectionTiming;

/// 管理器配置
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    // 未显式指定注入时机的 PageMod 使用该默认值
    pub default_timing: InjectionTiming,
    // 没有外部错误监听器时，是否以 error 级别记录脚本错误（否则降为 debug）
    pub log_uncaught_errors: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timing: InjectionTiming::AtCreation,
            log_uncaught_errors: true,
        }
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> ManagerConfig {
        ManagerConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: ManagerConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
        }
    }

    pub fn default_timing(mut self, timing: InjectionTiming) -> Self {
        self.config.default_timing = timing;
        self
    }

    /// 关闭后，没有错误监听器的脚本错误只以 debug 级别记录
    pub fn log_uncaught_errors(mut self, enabled: bool) -> Self {
        self.config.log_uncaught_errors = enabled;
        self
    }

    pub fn build(self) -> ManagerConfig {
        self.config
    }
}
