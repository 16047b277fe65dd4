//! 编译后的URL匹配器模型

use std::fmt;

use crate::host::UrlInfo;

/// AnyWebPage 规则接受的协议
const WEB_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// URL规则编译后的匹配器
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// `*`：任意 http/https/ftp 页面
    AnyWebPage,
    /// `*.example.com`：主机名以该域名结尾
    DomainSuffix(String),
    /// `http://example.com/page`：完整URL精确匹配
    ExactUrl(String),
    /// `http://example.com/*`：URL前缀匹配
    UrlPrefix(String),
}

impl Matcher {
    /// 编译规则字符串，等价于 [`RuleCompiler::compile`](super::RuleCompiler::compile)
    pub fn compile(pattern: &str) -> crate::PmResult<Self> {
        super::RuleCompiler::compile(pattern)
    }

    /// 判断文档地址是否命中
    ///
    /// 缺失 host/href 时视为不匹配，不会报错。
    /// 域名匹配是原始的字符串后缀比较，不检查标签边界：
    /// `*.example.com` 同样命中 `notexample.com`。
    pub fn matches(&self, info: &UrlInfo) -> bool {
        match self {
            Matcher::AnyWebPage => info
                .scheme()
                .is_some_and(|scheme| WEB_SCHEMES.contains(&scheme)),
            Matcher::DomainSuffix(domain) => info
                .host()
                .is_some_and(|host| host.ends_with(domain.as_str())),
            Matcher::ExactUrl(url) => info.href().is_some_and(|href| href == url),
            Matcher::UrlPrefix(prefix) => info
                .href()
                .is_some_and(|href| href.starts_with(prefix.as_str())),
        }
    }

    /// 匹配器类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Matcher::AnyWebPage => "any_web_page",
            Matcher::DomainSuffix(_) => "domain_suffix",
            Matcher::ExactUrl(_) => "exact_url",
            Matcher::UrlPrefix(_) => "url_prefix",
        }
    }

    /// 规则描述（用于日志/调试输出）
    pub fn describe(&self) -> String {
        match self {
            Matcher::AnyWebPage => "any_web_page".to_string(),
            Matcher::DomainSuffix(domain) => format!("domain_suffix: {}", domain),
            Matcher::ExactUrl(url) => format!("exact_url: {}", url),
            Matcher::UrlPrefix(prefix) => format!("url_prefix: {}", prefix),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
