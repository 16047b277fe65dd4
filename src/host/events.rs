//! 宿主文档生命周期事件源
//!
//! 宿主在每个新的顶层脚本全局对象创建时触发一次 `DocumentCreated`，
//! 在文档 DOM 解析完成时触发一次 `DocumentReady`。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::document::{Document, DocumentId, UrlInfo};
use crate::error::PmResult;

/// 文档生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    DocumentCreated,
    DocumentReady,
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::DocumentCreated => f.write_str("document-created"),
            HostEvent::DocumentReady => f.write_str("document-ready"),
        }
    }
}

/// 事件订阅标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// 事件处理函数
pub type HostHandler = Rc<dyn Fn(&Document)>;

/// 宿主事件源接口
///
/// 实现必须允许在处理函数内部订阅或取消订阅。
pub trait HostEvents {
    fn subscribe(&self, event: HostEvent, handler: HostHandler) -> SubscriptionId;

    /// 返回该订阅此前是否存在
    fn unsubscribe(&self, event: HostEvent, id: SubscriptionId) -> bool;
}

/// 内存宿主：手动触发文档事件，供命令行工具与测试驱动分发流程
#[derive(Default)]
pub struct MemoryHost {
    next_subscription: Cell<u64>,
    next_document: Cell<u64>,
    handlers: RefCell<IndexMap<SubscriptionId, (HostEvent, HostHandler)>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配文档标识并创建文档（不触发任何事件）
    pub fn open_document(&self, url: &str) -> Document {
        let id = self.next_document.get() + 1;
        self.next_document.set(id);
        Document::new(DocumentId(id), UrlInfo::parse(url))
    }

    /// 同 [`open_document`](Self::open_document)，但地址非法时报错
    pub fn open_document_strict(&self, url: &str) -> PmResult<Document> {
        let id = self.next_document.get() + 1;
        let document = Document::parse(DocumentId(id), url)?;
        self.next_document.set(id);
        Ok(document)
    }

    /// 向所有订阅者派发事件，返回被调用的处理函数数量
    pub fn fire(&self, event: HostEvent, document: &Document) -> usize {
        // 先拷贝处理函数列表，处理函数内部可以自由增删订阅
        let snapshot: Vec<(SubscriptionId, HostHandler)> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(_, (ev, _))| *ev == event)
            .map(|(id, (_, handler))| (*id, Rc::clone(handler)))
            .collect();

        let mut called = 0;
        for (id, handler) in snapshot {
            // 已被前面的处理函数取消的订阅不再调用
            if !self.handlers.borrow().contains_key(&id) {
                continue;
            }
            handler(document);
            called += 1;
        }

        debug!("host fired {} for {} to {} handler(s)", event, document.id(), called);
        called
    }

    pub fn create_document(&self, document: &Document) -> usize {
        self.fire(HostEvent::DocumentCreated, document)
    }

    pub fn ready_document(&self, document: &Document) -> usize {
        self.fire(HostEvent::DocumentReady, document)
    }

    /// 完整加载：先 created 再 ready
    pub fn load_document(&self, document: &Document) {
        self.create_document(document);
        self.ready_document(document);
    }

    /// 指定事件当前的订阅数量
    pub fn handler_count(&self, event: HostEvent) -> usize {
        self.handlers
            .borrow()
            .values()
            .filter(|(ev, _)| *ev == event)
            .count()
    }
}

impl HostEvents for MemoryHost {
    fn subscribe(&self, event: HostEvent, handler: HostHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get() + 1);
        self.next_subscription.set(id.0);
        self.handlers.borrow_mut().insert(id, (event, handler));
        id
    }

    fn unsubscribe(&self, event: HostEvent, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get(&id) {
            Some((ev, _)) if *ev == event => {
                handlers.shift_remove(&id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_fire() {
        let host = MemoryHost::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        host.subscribe(
            HostEvent::DocumentCreated,
            Rc::new(move |doc: &Document| sink.borrow_mut().push(doc.id())),
        );

        let doc = host.open_document("http://example.com/");
        assert_eq!(host.create_document(&doc), 1);
        assert_eq!(host.ready_document(&doc), 0);
        assert_eq!(*seen.borrow(), vec![doc.id()]);
    }

    #[test]
    fn test_unsubscribe_checks_event() {
        let host = MemoryHost::new();
        let id = host.subscribe(HostEvent::DocumentReady, Rc::new(|_: &Document| {}));
        assert!(!host.unsubscribe(HostEvent::DocumentCreated, id));
        assert_eq!(host.handler_count(HostEvent::DocumentReady), 1);
        assert!(host.unsubscribe(HostEvent::DocumentReady, id));
        assert!(!host.unsubscribe(HostEvent::DocumentReady, id));
        assert_eq!(host.handler_count(HostEvent::DocumentReady), 0);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let host = Rc::new(MemoryHost::new());
        let slot: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0));

        let weak_host = Rc::downgrade(&host);
        let slot_in = Rc::clone(&slot);
        let calls_in = Rc::clone(&calls);
        let id = host.subscribe(
            HostEvent::DocumentReady,
            Rc::new(move |_: &Document| {
                calls_in.set(calls_in.get() + 1);
                if let (Some(host), Some(id)) = (weak_host.upgrade(), slot_in.get()) {
                    host.unsubscribe(HostEvent::DocumentReady, id);
                }
            }),
        );
        slot.set(Some(id));

        let doc = host.open_document("http://example.com/");
        host.ready_document(&doc);
        host.ready_document(&doc);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_open_document_ids_are_unique() {
        let host = MemoryHost::new();
        let a = host.open_document("http://a.com/");
        let b = host.open_document("about:blank");
        assert_ne!(a.id(), b.id());
        assert!(host.open_document_strict("not a url").is_err());
        let c = host.open_document_strict("https://c.com/").unwrap();
        assert_eq!(c.id(), DocumentId(3));
    }
}
