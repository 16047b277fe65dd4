//! 文档句柄与地址信息提取

use std::fmt;

use url::Url;

use crate::error::PmResult;

/// 宿主分配的文档标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// 规则匹配所需的文档地址信息
///
/// 部分协议（如 `about:`）没有 host，相应字段为 `None`。
/// scheme 不带结尾的冒号。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlInfo {
    scheme: Option<String>,
    host: Option<String>,
    href: Option<String>,
}

impl UrlInfo {
    /// 直接由各字段构造（宿主已自行拆分地址时使用）
    pub fn new(scheme: Option<&str>, host: Option<&str>, href: Option<&str>) -> Self {
        Self {
            scheme: scheme.map(str::to_string),
            host: host.map(str::to_string),
            href: href.map(str::to_string),
        }
    }

    /// 解析地址字符串；无法解析时仅保留原始 href
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) => Self::from(&url),
            Err(_) => Self {
                scheme: None,
                host: None,
                href: Some(raw.to_string()),
            },
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }
}

impl From<&Url> for UrlInfo {
    fn from(url: &Url) -> Self {
        Self {
            scheme: Some(url.scheme().to_string()),
            host: url.host_str().filter(|host| !host.is_empty()).map(str::to_string),
            href: Some(url.as_str().to_string()),
        }
    }
}

/// 宿主传入的文档句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    location: UrlInfo,
}

impl Document {
    pub fn new(id: DocumentId, location: UrlInfo) -> Self {
        Self { id, location }
    }

    /// 严格解析地址并创建文档，地址非法时返回 `UrlError`
    pub fn parse(id: DocumentId, url: &str) -> PmResult<Self> {
        let url = Url::parse(url)?;
        Ok(Self::new(id, UrlInfo::from(&url)))
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn location(&self) -> &UrlInfo {
        &self.location
    }

    /// 完整地址，缺失时返回空字符串
    pub fn href(&self) -> &str {
        self.location.href().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageModError;

    #[test]
    fn test_parse_http_url() {
        let info = UrlInfo::parse("https://addons.mozilla.org/en-US/firefox/");
        assert_eq!(info.scheme(), Some("https"));
        assert_eq!(info.host(), Some("addons.mozilla.org"));
        assert_eq!(info.href(), Some("https://addons.mozilla.org/en-US/firefox/"));
    }

    #[test]
    fn test_parse_about_url_has_no_host() {
        let info = UrlInfo::parse("about:blank");
        assert_eq!(info.scheme(), Some("about"));
        assert_eq!(info.host(), None);
        assert_eq!(info.href(), Some("about:blank"));
    }

    #[test]
    fn test_parse_invalid_keeps_href() {
        let info = UrlInfo::parse("not a url");
        assert_eq!(info.scheme(), None);
        assert_eq!(info.host(), None);
        assert_eq!(info.href(), Some("not a url"));
    }

    #[test]
    fn test_document_parse() {
        let doc = Document::parse(DocumentId(7), "http://example.com/x").unwrap();
        assert_eq!(doc.id(), DocumentId(7));
        assert_eq!(doc.href(), "http://example.com/x");
        assert_eq!(doc.id().to_string(), "doc#7");

        let err = Document::parse(DocumentId(8), "::").unwrap_err();
        assert!(matches!(err, PageModError::UrlError(_)));
    }
}
