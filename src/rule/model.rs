//! PageMod 选项数据模型
//! 运行时选项（含回调）与可序列化的 JSON 定义

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PageModError, PmResult};
use crate::page_mod::{AttachEvent, AttachListener, ErrorEvent, ErrorListener};

/// 脚本注入时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InjectionTiming {
    /// 文档脚本全局对象创建时立即注入
    #[default]
    #[serde(rename = "start", alias = "at-creation")]
    AtCreation,
    /// 等待 DOM 解析完成后注入
    #[serde(rename = "ready", alias = "at-ready")]
    AtReady,
}

impl fmt::Display for InjectionTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionTiming::AtCreation => f.write_str("start"),
            InjectionTiming::AtReady => f.write_str("ready"),
        }
    }
}

/// 脚本载荷：内联源码和/或外部脚本地址
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentScript {
    pub source: Option<String>,
    pub url: Option<String>,
}

impl ContentScript {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            url: None,
        }
    }

    pub fn external(url: impl Into<String>) -> Self {
        Self {
            source: None,
            url: Some(url.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.url.is_none()
    }
}

/// `include` 选项：单条规则或规则数组
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    One(String),
    Many(Vec<String>),
}

impl Include {
    /// 从 JSON 值解析，只接受字符串或字符串数组
    pub fn from_value(value: &Value) -> PmResult<Self> {
        match value {
            Value::String(s) => Ok(Include::One(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(PageModError::invalid_include(format!(
                        "数组元素必须是字符串，实际为 {}",
                        other
                    ))),
                })
                .collect::<PmResult<Vec<_>>>()
                .map(Include::Many),
            Value::Null => Err(PageModError::invalid_include("缺少 include 选项")),
            other => Err(PageModError::invalid_include(format!(
                "不支持的 include 类型：{}",
                other
            ))),
        }
    }

    /// 展开为规则列表，空字符串或空数组视为无效
    pub fn into_patterns(self) -> PmResult<Vec<String>> {
        let patterns = match self {
            Include::One(pattern) => vec![pattern],
            Include::Many(patterns) => patterns,
        };

        if patterns.is_empty() {
            return Err(PageModError::invalid_include("include 数组为空"));
        }
        if patterns.iter().any(|p| p.is_empty()) {
            return Err(PageModError::invalid_include("include 含有空字符串"));
        }
        Ok(patterns)
    }
}

impl From<&str> for Include {
    fn from(pattern: &str) -> Self {
        Include::One(pattern.to_string())
    }
}

impl From<String> for Include {
    fn from(pattern: String) -> Self {
        Include::One(pattern)
    }
}

impl From<Vec<String>> for Include {
    fn from(patterns: Vec<String>) -> Self {
        Include::Many(patterns)
    }
}

impl From<Vec<&str>> for Include {
    fn from(patterns: Vec<&str>) -> Self {
        Include::Many(patterns.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Include {
    fn from(patterns: [&str; N]) -> Self {
        Include::Many(patterns.iter().map(|p| p.to_string()).collect())
    }
}

/// 创建 PageMod 的运行时选项
#[derive(Clone)]
pub struct PageModOptions {
    pub include: Include,
    pub script: ContentScript,
    /// `None` 时使用管理器配置中的默认时机
    pub timing: Option<InjectionTiming>,
    pub on_attach: Option<AttachListener>,
    pub on_error: Option<ErrorListener>,
}

impl PageModOptions {
    pub fn new(include: impl Into<Include>) -> Self {
        Self {
            include: include.into(),
            script: ContentScript::default(),
            timing: None,
            on_attach: None,
            on_error: None,
        }
    }

    pub fn content_script(mut self, source: impl Into<String>) -> Self {
        self.script.source = Some(source.into());
        self
    }

    pub fn content_script_url(mut self, url: impl Into<String>) -> Self {
        self.script.url = Some(url.into());
        self
    }

    pub fn timing(mut self, timing: InjectionTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn on_attach(mut self, listener: impl Fn(&AttachEvent) + 'static) -> Self {
        self.on_attach = Some(Rc::new(listener));
        self
    }

    pub fn on_error(mut self, listener: impl Fn(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Rc::new(listener));
        self
    }
}

impl fmt::Debug for PageModOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageModOptions")
            .field("include", &self.include)
            .field("script", &self.script)
            .field("timing", &self.timing)
            .field("on_attach", &self.on_attach.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// PageMod 的 JSON 定义
///
/// ```json
/// {
///   "name": "amo",
///   "include": ["*.mozilla.org"],
///   "contentScript": "document.body.dataset.modded = 1;",
///   "contentScriptWhen": "ready"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub include: Value,
    #[serde(default)]
    pub content_script: Option<String>,
    #[serde(rename = "contentScriptURL", alias = "contentScriptUrl", default)]
    pub content_script_url: Option<String>,
    #[serde(default)]
    pub content_script_when: Option<InjectionTiming>,
}

impl PageModDefinition {
    pub fn from_json(json: &str) -> PmResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 解析定义数组
    pub fn list_from_json(json: &str) -> PmResult<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }

    /// 转换为运行时选项，校验 include 类型
    pub fn into_options(self) -> PmResult<PageModOptions> {
        let include = Include::from_value(&self.include)?;
        Ok(PageModOptions {
            include,
            script: ContentScript {
                source: self.content_script,
                url: self.content_script_url,
            },
            timing: self.content_script_when,
            on_attach: None,
            on_error: None,
        })
    }
}
