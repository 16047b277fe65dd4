//! PageMod：包含规则 + 脚本载荷 + 注入时机
//!
//! 创建时立即把所有规则订阅到规则注册表（任一规则无效则回滚已订阅的规则），
//! 销毁时退订全部规则并取消所有等待中的 ready 监听。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use super::events::{
    AttachEvent, AttachListener, ErrorEvent, ErrorListener, ListenerId, ListenerList,
};
use crate::config::ManagerConfig;
use crate::error::{PageModError, PmResult};
use crate::host::{
    Document, DocumentId, ErrorCallback, HostEvent, HostEvents, HostHandler, Sandbox,
    SandboxRequest, ScriptError, SubscriptionId,
};
use crate::rule::{ContentScript, InjectionTiming, PageModOptions, RuleCallback, RuleRegistry};
use crate::utils::compress_pattern_list;

static NEXT_MOD_ID: AtomicU64 = AtomicU64::new(1);

/// PageMod 标识，进程内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModId(pub u64);

impl ModId {
    fn next() -> Self {
        ModId(NEXT_MOD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModState {
    Created,
    Registered,
    Destroyed,
}

/// 创建 PageMod 所需的协作方
#[derive(Clone)]
pub(crate) struct ModContext {
    pub registry: Rc<RuleRegistry>,
    pub host: Rc<dyn HostEvents>,
    pub sandbox: Rc<dyn Sandbox>,
    pub config: ManagerConfig,
}

struct PageModInner {
    id: ModId,
    include: Vec<String>,
    script: ContentScript,
    timing: InjectionTiming,
    log_uncaught: bool,
    registry: Rc<RuleRegistry>,
    host: Rc<dyn HostEvents>,
    sandbox: Rc<dyn Sandbox>,
    state: Cell<ModState>,
    // 等待 DocumentReady 的文档 → 宿主订阅
    pending_ready: RefCell<FxHashMap<DocumentId, SubscriptionId>>,
    attach_listeners: ListenerList<AttachEvent>,
    error_listeners: ListenerList<ErrorEvent>,
}

/// PageMod 句柄，克隆开销很小，所有克隆共享同一个实例
#[derive(Clone)]
pub struct PageMod {
    inner: Rc<PageModInner>,
}

impl PageMod {
    pub(crate) fn create(options: PageModOptions, ctx: &ModContext) -> PmResult<Self> {
        let mut include: Vec<String> = Vec::new();
        for pattern in options.include.into_patterns()? {
            if !include.contains(&pattern) {
                include.push(pattern);
            }
        }

        let inner = Rc::new(PageModInner {
            id: ModId::next(),
            include,
            script: options.script,
            timing: options.timing.unwrap_or(ctx.config.default_timing),
            log_uncaught: ctx.config.log_uncaught_errors,
            registry: Rc::clone(&ctx.registry),
            host: Rc::clone(&ctx.host),
            sandbox: Rc::clone(&ctx.sandbox),
            state: Cell::new(ModState::Created),
            pending_ready: RefCell::new(FxHashMap::default()),
            attach_listeners: ListenerList::default(),
            error_listeners: ListenerList::default(),
        });

        inner.subscribe_rules()?;

        if let Some(listener) = options.on_attach {
            inner.attach_listeners.add(listener);
        }
        if let Some(listener) = options.on_error {
            inner.error_listeners.add(listener);
        }

        debug!(
            "{} created include={} timing={}",
            inner.id,
            compress_pattern_list(&inner.include),
            inner.timing
        );
        Ok(PageMod { inner })
    }

    pub fn id(&self) -> ModId {
        self.inner.id
    }

    /// 去重后的包含规则
    pub fn include(&self) -> &[String] {
        &self.inner.include
    }

    pub fn script(&self) -> &ContentScript {
        &self.inner.script
    }

    pub fn timing(&self) -> InjectionTiming {
        self.inner.timing
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state.get() == ModState::Registered
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.get() == ModState::Destroyed
    }

    /// 正在等待 DocumentReady 的文档数量
    pub fn pending_ready_count(&self) -> usize {
        self.inner.pending_ready.borrow().len()
    }

    /// 规则命中某个文档时由管理器调用
    ///
    /// 未注册到管理器（或已销毁）时忽略。
    pub fn on_document_match(&self, document: &Document) {
        self.inner.on_document_match(document);
    }

    /// 退订全部规则并取消等待中的 ready 监听，重复调用无效果
    ///
    /// 返回本次调用是否真正执行了销毁。
    pub fn destroy(&self) -> bool {
        self.inner.release()
    }

    pub fn on_attach(&self, listener: impl Fn(&AttachEvent) + 'static) -> ListenerId {
        let listener: AttachListener = Rc::new(listener);
        self.inner.attach_listeners.add(listener)
    }

    pub fn off_attach(&self, id: ListenerId) -> bool {
        self.inner.attach_listeners.remove(id)
    }

    /// 添加外部错误监听器；存在外部监听器时不再写错误日志
    pub fn on_error(&self, listener: impl Fn(&ErrorEvent) + 'static) -> ListenerId {
        let listener: ErrorListener = Rc::new(listener);
        self.inner.error_listeners.add(listener)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.inner.error_listeners.remove(id)
    }

    /// 当前脚本错误是否会由默认日志输出
    pub fn reports_to_log(&self) -> bool {
        self.inner.log_uncaught && self.inner.error_listeners.len() == 0
    }

    pub(crate) fn mark_registered(&self) -> PmResult<()> {
        match self.inner.state.get() {
            ModState::Destroyed => Err(PageModError::ModDestroyed(self.inner.id)),
            _ => {
                self.inner.state.set(ModState::Registered);
                Ok(())
            }
        }
    }

    pub(crate) fn uses_registry(&self, registry: &Rc<RuleRegistry>) -> bool {
        Rc::ptr_eq(&self.inner.registry, registry)
    }
}

impl PartialEq for PageMod {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PageMod {}

impl fmt::Debug for PageMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageMod")
            .field("id", &self.inner.id)
            .field("include", &self.inner.include)
            .field("timing", &self.inner.timing)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl PageModInner {
    fn subscribe_rules(self: &Rc<Self>) -> PmResult<()> {
        for (idx, pattern) in self.include.iter().enumerate() {
            let weak = Rc::downgrade(self);
            let callback: RuleCallback = Rc::new(move |document: &Document| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_document_match(document);
                }
            });

            if let Err(err) = self.registry.register(pattern, self.id, callback) {
                // 回滚已订阅的规则，不留下任何注册表条目
                for done in &self.include[..idx] {
                    self.registry.unregister(done, self.id);
                }
                self.state.set(ModState::Destroyed);
                return Err(PageModError::InvalidInclude {
                    reason: format!("规则 '{}' 无效", pattern),
                    source: Some(Box::new(err)),
                });
            }
        }
        Ok(())
    }

    fn on_document_match(self: &Rc<Self>, document: &Document) {
        if self.state.get() != ModState::Registered {
            return;
        }

        match self.timing {
            InjectionTiming::AtCreation => self.attach(document),
            InjectionTiming::AtReady => self.wait_for_ready(document),
        }
    }

    /// 注册一次性的 DocumentReady 监听，只响应目标文档
    fn wait_for_ready(self: &Rc<Self>, document: &Document) {
        let target = document.id();
        if self.pending_ready.borrow().contains_key(&target) {
            return;
        }

        let weak = Rc::downgrade(self);
        let handler: HostHandler = Rc::new(move |ready: &Document| {
            if ready.id() != target {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.on_ready(ready);
            }
        });

        let subscription = self.host.subscribe(HostEvent::DocumentReady, handler);
        self.pending_ready.borrow_mut().insert(target, subscription);
        debug!("{} waiting for ready on {}", self.id, target);
    }

    fn on_ready(self: &Rc<Self>, document: &Document) {
        let subscription = self.pending_ready.borrow_mut().remove(&document.id());
        let Some(subscription) = subscription else {
            return;
        };
        self.host.unsubscribe(HostEvent::DocumentReady, subscription);

        if self.state.get() == ModState::Registered {
            self.attach(document);
        }
    }

    fn attach(self: &Rc<Self>, document: &Document) {
        let weak = Rc::downgrade(self);
        let document_id = document.id();
        let on_error: ErrorCallback = Rc::new(move |error: ScriptError| {
            if let Some(inner) = weak.upgrade() {
                inner.report_error(document_id, error);
            }
        });

        let request = SandboxRequest {
            document,
            script: &self.script,
            on_error,
        };

        match self.sandbox.run(request) {
            Ok(handle) => {
                debug!("{} attached to {} ({})", self.id, document_id, document.href());
                self.attach_listeners.emit(&AttachEvent {
                    mod_id: self.id,
                    document: document.clone(),
                    handle,
                });
            }
            Err(err) => self.report_error(document_id, ScriptError::from(err)),
        }
    }

    /// 有外部监听器时只通知监听器，否则写错误日志；关闭错误日志时降为 debug 级别
    fn report_error(&self, document_id: DocumentId, script_error: ScriptError) {
        if self.error_listeners.len() > 0 {
            self.error_listeners.emit(&ErrorEvent {
                mod_id: self.id,
                document_id,
                error: script_error,
            });
            return;
        }

        if self.log_uncaught {
            error!(
                mod_id = %self.id,
                document = %document_id,
                file = ?script_error.file_name,
                line = ?script_error.line_number,
                stack = ?script_error.stack,
                "uncaught content script error: {}",
                script_error.message
            );
        } else {
            debug!(
                mod_id = %self.id,
                document = %document_id,
                "content script error (error log disabled): {}",
                script_error
            );
        }
    }

    fn release(&self) -> bool {
        if self.state.replace(ModState::Destroyed) == ModState::Destroyed {
            return false;
        }

        for pattern in &self.include {
            self.registry.unregister(pattern, self.id);
        }

        let pending: Vec<SubscriptionId> = self
            .pending_ready
            .borrow_mut()
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();
        for subscription in pending {
            self.host.unsubscribe(HostEvent::DocumentReady, subscription);
        }

        debug!("{} destroyed", self.id);
        true
    }
}

impl Drop for PageModInner {
    fn drop(&mut self) {
        self.release();
    }
}
