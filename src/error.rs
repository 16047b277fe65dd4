//! 全局错误类型定义

use thiserror::Error;
use serde_json::Error as SerdeJsonError;
use url::ParseError as UrlParseError;

use crate::host::ScriptError;
use crate::page_mod::ModId;

/// URL规则语法错误的具体原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternError {
    #[error("通配符 '*' 最多只能出现一次")]
    MultipleWildcards,
    #[error("期望 *.<域名> 形式的通配符")]
    ExpectedDomainWildcard,
    #[error("*. 之后缺少域名")]
    EmptyDomain,
    #[error("不使用 *.example.org 通配符时，规则必须是完整URL或URL前缀，当前字符串不会匹配任何页面")]
    NotUrlLike,
    #[error("通配符位置不合法，只能作为首字符或尾字符")]
    UnexpectedWildcardPosition,
}

#[derive(Error, Debug)]
pub enum PageModError {
    // 规则相关错误
    #[error("无效的URL规则 '{pattern}'：{kind}")]
    InvalidPattern {
        pattern: String,
        kind: PatternError,
    },
    #[error("PageMod 必须提供字符串或字符串数组形式的 `include` 选项：{reason}")]
    InvalidInclude {
        reason: String,
        #[source]
        source: Option<Box<PageModError>>,
    },

    // 脚本执行相关错误
    #[error("内容脚本执行失败：{0}")]
    ScriptRuntime(ScriptError),
    #[error("沙箱启动失败：{0}")]
    Sandbox(String),

    // 管理器相关错误
    #[error("PageMod {0} 已销毁")]
    ModDestroyed(ModId),
    #[error("PageMod {0} 不属于当前管理器")]
    ForeignMod(ModId),
    #[error("全局 PageModManager 未初始化")]
    ManagerNotInitialized,
    #[error("PageModManager 已关闭")]
    ManagerShutDown,

    // 基础错误
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),
}

impl PageModError {
    pub(crate) fn invalid_pattern(pattern: &str, kind: PatternError) -> Self {
        PageModError::InvalidPattern {
            pattern: pattern.to_string(),
            kind,
        }
    }

    pub(crate) fn invalid_include(reason: impl Into<String>) -> Self {
        PageModError::InvalidInclude {
            reason: reason.into(),
            source: None,
        }
    }
}

// 全局Result类型
pub type PmResult<T> = Result<T, PageModError>;
