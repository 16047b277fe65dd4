//! 规则编译器核心
//! 仅负责将URL规则字符串编译为匹配器，无共享状态
//!
//! 支持的规则形式：
//! 1. `*`：任意 http(s)/ftp 页面
//! 2. `*.domain.name`：该域名及其所有子域名下的页面，与协议无关
//! 3. `http://example.com/*`：以指定前缀开头的URL
//! 4. `http://example.com/test`：单个精确URL

use super::pattern::Matcher;
use crate::error::{PageModError, PatternError, PmResult};

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译单条URL规则
    pub fn compile(pattern: &str) -> PmResult<Matcher> {
        let first_wildcard = pattern.find('*');
        if first_wildcard != pattern.rfind('*') {
            return Err(PageModError::invalid_pattern(pattern, PatternError::MultipleWildcards));
        }

        if first_wildcard == Some(0) {
            return Self::compile_leading_wildcard(pattern);
        }

        // 非 *.domain 形式必须像一个URL，前缀规则同样适用
        if !pattern.contains(':') {
            return Err(PageModError::invalid_pattern(pattern, PatternError::NotUrlLike));
        }

        match first_wildcard {
            None => Ok(Matcher::ExactUrl(pattern.to_string())),
            Some(pos) if pos == pattern.len() - 1 => {
                Ok(Matcher::UrlPrefix(pattern[..pos].to_string()))
            }
            Some(_) => Err(PageModError::invalid_pattern(
                pattern,
                PatternError::UnexpectedWildcardPosition,
            )),
        }
    }

    /// 编译以通配符开头的规则（`*` 或 `*.domain`）
    fn compile_leading_wildcard(pattern: &str) -> PmResult<Matcher> {
        if pattern.len() == 1 {
            return Ok(Matcher::AnyWebPage);
        }

        let Some(domain) = pattern.strip_prefix("*.") else {
            return Err(PageModError::invalid_pattern(pattern, PatternError::ExpectedDomainWildcard));
        };

        if domain.is_empty() {
            return Err(PageModError::invalid_pattern(pattern, PatternError::EmptyDomain));
        }

        Ok(Matcher::DomainSuffix(domain.to_string()))
    }
}
