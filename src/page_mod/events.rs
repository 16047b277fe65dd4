//! PageMod 事件与监听器列表

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::page_mod::ModId;
use crate::host::{Document, DocumentId, SandboxHandle, ScriptError};

/// 脚本成功注入到某个文档
#[derive(Debug, Clone)]
pub struct AttachEvent {
    pub mod_id: ModId,
    pub document: Document,
    pub handle: SandboxHandle,
}

/// 注入脚本运行期错误，或沙箱拒绝运行
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub mod_id: ModId,
    pub document_id: DocumentId,
    pub error: ScriptError,
}

pub type AttachListener = Rc<dyn Fn(&AttachEvent)>;
pub type ErrorListener = Rc<dyn Fn(&ErrorEvent)>;

/// 监听器标识，用于退订
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 有序监听器列表
pub(crate) struct ListenerList<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Rc<dyn Fn(&E)>)>>,
}

impl<E> Default for ListenerList<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> ListenerList<E> {
    pub(crate) fn add(&self, listener: Rc<dyn Fn(&E)>) -> ListenerId {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// 按注册顺序调用，返回调用次数
    pub(crate) fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Rc<dyn Fn(&E)>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_list_order_and_removal() {
        let list: ListenerList<u32> = ListenerList::default();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let first = list.add(Rc::new(move |v: &u32| sink.borrow_mut().push(("first", *v))));
        let sink = Rc::clone(&seen);
        list.add(Rc::new(move |v: &u32| sink.borrow_mut().push(("second", *v))));

        assert_eq!(list.emit(&1), 2);
        assert!(list.remove(first));
        assert!(!list.remove(first));
        assert_eq!(list.emit(&2), 1);
        assert_eq!(list.len(), 1);
        assert_eq!(*seen.borrow(), vec![("first", 1), ("second", 1), ("second", 2)]);
    }
}
