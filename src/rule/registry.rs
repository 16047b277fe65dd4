//! 规则注册表
//! 规则字符串 → (编译后的匹配器, 订阅者集合)
//!
//! 核心约束：
//! 1. 同一规则字符串只编译一次，所有订阅者共享同一个匹配器
//! 2. 条目存在当且仅当其订阅者集合非空，最后一个订阅者退订时立即删除条目
//! 3. 条目与订阅者均保持插入顺序

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::compiler::{Matcher, RuleCompiler};
use crate::error::PmResult;
use crate::host::{Document, UrlInfo};
use crate::page_mod::ModId;

/// 规则命中时的回调
pub type RuleCallback = Rc<dyn Fn(&Document)>;

/// 新规则加入时的通知回调
pub type RuleAddedListener = Rc<dyn Fn(&str, &Matcher)>;

struct RuleEntry {
    matcher: Rc<Matcher>,
    subscribers: IndexMap<ModId, RuleCallback>,
}

/// 规则注册表
#[derive(Default)]
pub struct RuleRegistry {
    entries: RefCell<IndexMap<String, RuleEntry>>,
    compile_count: Cell<usize>,
    added_listeners: RefCell<Vec<RuleAddedListener>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅规则
    ///
    /// 已有条目直接复用匹配器，否则先编译（语法错误原样返回，注册表不变）。
    /// 同一订阅者重复订阅不产生任何效果。
    pub fn register(&self, pattern: &str, id: ModId, callback: RuleCallback) -> PmResult<Rc<Matcher>> {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(pattern) {
            entry.subscribers.entry(id).or_insert(callback);
            return Ok(Rc::clone(&entry.matcher));
        }

        let matcher = Rc::new(RuleCompiler::compile(pattern)?);
        self.compile_count.set(self.compile_count.get() + 1);

        let mut subscribers = IndexMap::new();
        subscribers.insert(id, callback);
        entries.insert(
            pattern.to_string(),
            RuleEntry {
                matcher: Rc::clone(&matcher),
                subscribers,
            },
        );
        drop(entries);

        debug!("rule added: {} => {}", pattern, matcher);
        // 通知时不持有任何借用
        let listeners = self.added_listeners.borrow().clone();
        for listener in listeners {
            listener(pattern, &matcher);
        }

        Ok(matcher)
    }

    /// 退订规则，返回该订阅此前是否存在
    pub fn unregister(&self, pattern: &str, id: ModId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(pattern) else {
            return false;
        };

        if entry.subscribers.shift_remove(&id).is_none() {
            return false;
        }

        if entry.subscribers.is_empty() {
            entries.shift_remove(pattern);
            debug!("rule removed: {}", pattern);
        }
        true
    }

    /// 对所有命中的条目，按订阅顺序逐个调用 `f(订阅者, 回调)`
    ///
    /// 先收集命中结果再调用，回调内部可以修改注册表。
    pub fn for_each_match<F>(&self, info: &UrlInfo, mut f: F)
    where
        F: FnMut(ModId, &RuleCallback),
    {
        let matched: Vec<(ModId, RuleCallback)> = self
            .entries
            .borrow()
            .values()
            .filter(|entry| entry.matcher.matches(info))
            .flat_map(|entry| {
                entry
                    .subscribers
                    .iter()
                    .map(|(id, callback)| (*id, Rc::clone(callback)))
            })
            .collect();

        for (id, callback) in &matched {
            f(*id, callback);
        }
    }

    /// 注册新规则加入的监听器
    pub fn on_rule_added(&self, listener: impl Fn(&str, &Matcher) + 'static) {
        self.added_listeners.borrow_mut().push(Rc::new(listener));
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.entries.borrow().contains_key(pattern)
    }

    /// 已编译的匹配器
    pub fn matcher(&self, pattern: &str) -> Option<Rc<Matcher>> {
        self.entries
            .borrow()
            .get(pattern)
            .map(|entry| Rc::clone(&entry.matcher))
    }

    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.entries
            .borrow()
            .get(pattern)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// 当前所有规则（插入顺序）
    pub fn patterns(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// 累计编译次数
    pub fn compile_count(&self) -> usize {
        self.compile_count.get()
    }

    /// 清空所有条目，返回被清除的条目数
    pub fn clear(&self) -> usize {
        let removed = self.entries.borrow_mut().drain(..).count();
        if removed > 0 {
            debug!("registry cleared, {} residual rule(s) dropped", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageModError;
    use crate::host::DocumentId;

    fn noop() -> RuleCallback {
        Rc::new(|_: &Document| {})
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> RuleCallback {
        let log = Rc::clone(log);
        Rc::new(move |_: &Document| log.borrow_mut().push(tag))
    }

    #[test]
    fn test_same_pattern_compiles_once() {
        let registry = RuleRegistry::new();
        let a = registry.register("*.example.com", ModId(1), noop()).unwrap();
        let b = registry.register("*.example.com", ModId(2), noop()).unwrap();

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(registry.compile_count(), 1);
        assert_eq!(registry.subscriber_count("*.example.com"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent_per_subscriber() {
        let registry = RuleRegistry::new();
        registry.register("*", ModId(1), noop()).unwrap();
        registry.register("*", ModId(1), noop()).unwrap();
        assert_eq!(registry.subscriber_count("*"), 1);

        assert!(registry.unregister("*", ModId(1)));
        assert!(!registry.contains("*"));
    }

    #[test]
    fn test_invalid_pattern_leaves_registry_unchanged() {
        let registry = RuleRegistry::new();
        let err = registry.register("http://*.a.com/x", ModId(1), noop()).unwrap_err();
        assert!(matches!(err, PageModError::InvalidPattern { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.compile_count(), 0);
    }

    #[test]
    fn test_last_unsubscribe_evicts_entry() {
        let registry = RuleRegistry::new();
        registry.register("http://example.com/*", ModId(1), noop()).unwrap();
        registry.register("http://example.com/*", ModId(2), noop()).unwrap();

        assert!(registry.unregister("http://example.com/*", ModId(1)));
        assert!(registry.contains("http://example.com/*"));

        let info = UrlInfo::parse("http://example.com/page");
        let mut hits = Vec::new();
        registry.for_each_match(&info, |id, _| hits.push(id));
        assert_eq!(hits, vec![ModId(2)]);

        assert!(registry.unregister("http://example.com/*", ModId(2)));
        assert!(!registry.contains("http://example.com/*"));
        assert!(registry.matcher("http://example.com/*").is_none());
        assert!(!registry.unregister("http://example.com/*", ModId(2)));

        // 重新订阅会重新编译
        registry.register("http://example.com/*", ModId(3), noop()).unwrap();
        assert_eq!(registry.compile_count(), 2);
    }

    #[test]
    fn test_unregister_unknown_subscriber() {
        let registry = RuleRegistry::new();
        registry.register("*", ModId(1), noop()).unwrap();
        assert!(!registry.unregister("*", ModId(9)));
        assert!(!registry.unregister("*.nothing.org", ModId(1)));
        assert_eq!(registry.subscriber_count("*"), 1);
    }

    #[test]
    fn test_for_each_match_subscriber_order() {
        let registry = RuleRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.register("*.example.com", ModId(3), recorder(&log, "third")).unwrap();
        registry.register("*.example.com", ModId(1), recorder(&log, "first")).unwrap();
        registry.register("*.example.org", ModId(2), recorder(&log, "other")).unwrap();

        let doc = Document::new(DocumentId(1), UrlInfo::parse("https://www.example.com/"));
        registry.for_each_match(doc.location(), |_, callback| callback(&doc));
        assert_eq!(*log.borrow(), vec!["third", "first"]);
    }

    #[test]
    fn test_callback_may_mutate_registry() {
        let registry = Rc::new(RuleRegistry::new());
        let weak = Rc::downgrade(&registry);
        registry
            .register(
                "*",
                ModId(1),
                Rc::new(move |_: &Document| {
                    if let Some(registry) = weak.upgrade() {
                        registry.unregister("*", ModId(1));
                    }
                }),
            )
            .unwrap();

        let doc = Document::new(DocumentId(1), UrlInfo::parse("http://a.com/"));
        registry.for_each_match(doc.location(), |_, callback| callback(&doc));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rule_added_fires_once_per_new_pattern() {
        let registry = RuleRegistry::new();
        let added = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&added);
        registry.on_rule_added(move |pattern, matcher| {
            sink.borrow_mut().push((pattern.to_string(), matcher.kind()));
        });

        registry.register("*", ModId(1), noop()).unwrap();
        registry.register("*", ModId(2), noop()).unwrap();
        registry.register("http://a.com/", ModId(1), noop()).unwrap();

        assert_eq!(
            *added.borrow(),
            vec![
                ("*".to_string(), "any_web_page"),
                ("http://a.com/".to_string(), "exact_url"),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let registry = RuleRegistry::new();
        registry.register("*", ModId(1), noop()).unwrap();
        registry.register("*.a.com", ModId(1), noop()).unwrap();
        assert_eq!(registry.patterns(), vec!["*".to_string(), "*.a.com".to_string()]);
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.clear(), 0);
    }
}
