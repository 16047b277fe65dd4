//! 日志输出用的字符串预览

use std::fmt::{self, Write};

/// 列表最多展示的规则数
const MAX_LISTED: usize = 5;
/// 每条规则最多展示的字符数
const MAX_PATTERN_CHARS: usize = 40;

/// 折叠空白并按字符数截断的惰性预览，格式化时才遍历源字符串
pub struct Compact<'a> {
    source: &'a str,
    limit: usize,
}

impl fmt::Display for Compact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut written = 0;
        let mut in_space = false;

        for ch in self.source.chars() {
            if written == self.limit {
                return f.write_char('…');
            }
            match (ch.is_whitespace(), in_space) {
                (true, true) => continue,
                (true, false) => f.write_char(' ')?,
                (false, _) => f.write_char(ch)?,
            }
            in_space = ch.is_whitespace();
            written += 1;
        }
        Ok(())
    }
}

/// 脚本源码、URL 等长字符串的单行预览
#[inline]
pub fn preview_compact(s: &str, max_len: usize) -> Compact<'_> {
    Compact {
        source: s,
        limit: max_len,
    }
}

/// 规则列表预览：`[a, b, ...… (total: N)]`
pub fn compress_pattern_list(patterns: &[String]) -> String {
    if patterns.is_empty() {
        return "[empty]".to_string();
    }

    let mut out = String::from("[");
    for (idx, pattern) in patterns.iter().take(MAX_LISTED).enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        // 写入 String 不会失败
        let _ = write!(out, "{}", preview_compact(pattern, MAX_PATTERN_CHARS));
    }
    if patterns.len() > MAX_LISTED {
        let _ = write!(out, "… (total: {})", patterns.len());
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_compact_folds_whitespace() {
        let source = "var a = 1;\n\n    var b = 2;";
        assert_eq!(preview_compact(source, 100).to_string(), "var a = 1; var b = 2;");
    }

    #[test]
    fn test_preview_compact_truncates() {
        assert_eq!(preview_compact("abcdefgh", 3).to_string(), "abc…");
        assert_eq!(preview_compact("abc", 3).to_string(), "abc");
        assert_eq!(preview_compact("", 3).to_string(), "");
    }

    #[test]
    fn test_compress_pattern_list() {
        assert_eq!(compress_pattern_list(&[]), "[empty]");
        let patterns: Vec<String> = vec!["*".into(), "*.mozilla.org".into()];
        assert_eq!(compress_pattern_list(&patterns), "[*, *.mozilla.org]");

        let many: Vec<String> = (0..7).map(|i| format!("http://{i}.com/*")).collect();
        let rendered = compress_pattern_list(&many);
        assert!(rendered.starts_with("[http://0.com/*, "));
        assert!(rendered.ends_with("… (total: 7)]"));
    }
}
