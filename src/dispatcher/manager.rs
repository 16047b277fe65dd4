//! PageMod 管理器：宿主文档事件与规则注册表之间的唯一桥梁
//!
//! 每个管理器拥有独立的规则注册表，订阅一次宿主的 `DocumentCreated`，
//! 新文档到达时对全部规则做一次匹配，并按注册顺序通知命中的 PageMod。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{PageModError, PmResult};
use crate::host::{Document, HostEvent, HostEvents, Sandbox, SubscriptionId};
use crate::page_mod::{ModContext, ModId, PageMod};
use crate::rule::{PageModOptions, RuleCallback, RuleRegistry};

/// PageMod 管理器
pub struct PageModManager {
    ctx: ModContext,
    // 活跃 PageMod，保持注册顺序
    mods: Rc<RefCell<IndexMap<ModId, PageMod>>>,
    subscription: Cell<Option<SubscriptionId>>,
    shut_down: Cell<bool>,
}

impl PageModManager {
    /// 创建管理器并订阅宿主的文档创建事件
    pub fn new(host: Rc<dyn HostEvents>, sandbox: Rc<dyn Sandbox>, config: ManagerConfig) -> Self {
        let registry = Rc::new(RuleRegistry::new());
        registry.on_rule_added(|pattern, matcher| {
            debug!("registry now tracks '{}' ({})", pattern, matcher.kind());
        });

        let mods: Rc<RefCell<IndexMap<ModId, PageMod>>> = Rc::new(RefCell::new(IndexMap::new()));
        let dispatch_registry = Rc::downgrade(&registry);
        let dispatch_mods = Rc::downgrade(&mods);
        let subscription = host.subscribe(
            HostEvent::DocumentCreated,
            Rc::new(move |document: &Document| {
                if let (Some(registry), Some(mods)) =
                    (dispatch_registry.upgrade(), dispatch_mods.upgrade())
                {
                    dispatch_document(&registry, &mods, document);
                }
            }),
        );

        info!("PageModManager started");
        Self {
            ctx: ModContext {
                registry,
                host,
                sandbox,
                config,
            },
            mods,
            subscription: Cell::new(Some(subscription)),
            shut_down: Cell::new(false),
        }
    }

    /// 创建 PageMod，规则立即编译并订阅到本管理器的注册表
    ///
    /// 创建后需调用 [`register_mod`](Self::register_mod) 才会开始注入。
    pub fn create_mod(&self, options: PageModOptions) -> PmResult<PageMod> {
        if self.shut_down.get() {
            return Err(PageModError::ManagerShutDown);
        }
        PageMod::create(options, &self.ctx)
    }

    /// 加入活跃集合，重复注册无效果
    pub fn register_mod(&self, page_mod: &PageMod) -> PmResult<()> {
        if self.shut_down.get() {
            return Err(PageModError::ManagerShutDown);
        }
        if !page_mod.uses_registry(&self.ctx.registry) {
            return Err(PageModError::ForeignMod(page_mod.id()));
        }

        page_mod.mark_registered()?;
        let mut mods = self.mods.borrow_mut();
        if !mods.contains_key(&page_mod.id()) {
            mods.insert(page_mod.id(), page_mod.clone());
            debug!("{} registered ({} live)", page_mod.id(), mods.len());
        }
        Ok(())
    }

    /// 销毁并移出活跃集合，返回该 PageMod 此前是否在集合中
    ///
    /// 其他管理器创建的 PageMod 不做任何处理，返回 `false`。
    pub fn unregister_mod(&self, page_mod: &PageMod) -> bool {
        if !page_mod.uses_registry(&self.ctx.registry) {
            debug!("{} belongs to another manager, unregister ignored", page_mod.id());
            return false;
        }
        page_mod.destroy();
        let removed = self.mods.borrow_mut().shift_remove(&page_mod.id());
        if removed.is_some() {
            debug!("{} unregistered", page_mod.id());
        }
        removed.is_some()
    }

    /// 处理一个新文档，返回被通知的 PageMod 数量
    pub fn on_document_created(&self, document: &Document) -> usize {
        dispatch_document(&self.ctx.registry, &self.mods, document)
    }

    /// 退订宿主事件、销毁所有活跃 PageMod、清空注册表残留条目，可重复调用
    pub fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }

        if let Some(subscription) = self.subscription.take() {
            self.ctx.host.unsubscribe(HostEvent::DocumentCreated, subscription);
        }

        let live: Vec<PageMod> = self.mods.borrow().values().cloned().collect();
        for page_mod in &live {
            self.unregister_mod(page_mod);
        }

        let residual = self.ctx.registry.clear();
        info!(
            "PageModManager shut down: {} mod(s) unregistered, {} residual rule(s) cleared",
            live.len(),
            residual
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    pub fn registry(&self) -> &Rc<RuleRegistry> {
        &self.ctx.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.ctx.config
    }

    pub fn has_mod(&self, page_mod: &PageMod) -> bool {
        self.mods.borrow().contains_key(&page_mod.id())
    }

    pub fn mod_count(&self) -> usize {
        self.mods.borrow().len()
    }

    /// 活跃 PageMod（注册顺序）
    pub fn mods(&self) -> Vec<PageMod> {
        self.mods.borrow().values().cloned().collect()
    }
}

impl Drop for PageModManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 对文档执行一次完整匹配
///
/// 同一个 PageMod 命中多条规则时只通知一次；通知顺序为注册顺序，
/// 与规则进入注册表的先后无关。未注册的 PageMod 不会被通知。
fn dispatch_document(
    registry: &RuleRegistry,
    mods: &RefCell<IndexMap<ModId, PageMod>>,
    document: &Document,
) -> usize {
    let mut matched: FxHashMap<ModId, RuleCallback> = FxHashMap::default();
    registry.for_each_match(document.location(), |id, callback| {
        matched.entry(id).or_insert_with(|| Rc::clone(callback));
    });

    // 先按注册顺序取出回调，调用期间不持有活跃集合的借用
    let ordered: Vec<RuleCallback> = mods
        .borrow()
        .keys()
        .filter_map(|id| matched.remove(id))
        .collect();

    debug!(
        "{} ({}) matched {} live mod(s)",
        document.id(),
        document.href(),
        ordered.len()
    );

    for callback in &ordered {
        callback(document);
    }
    ordered.len()
}
