//! 全局管理器单例（线程内）
use std::cell::RefCell;
use std::rc::Rc;

use super::manager::PageModManager;
use crate::config::ManagerConfig;
use crate::error::{PageModError, PmResult};
use crate::host::{HostEvents, Sandbox};
use crate::page_mod::PageMod;
use crate::rule::PageModOptions;

thread_local! {
    /// 全局管理器实例
    static GLOBAL_MANAGER: RefCell<Option<Rc<PageModManager>>> = const { RefCell::new(None) };
}

/// 初始化全局管理器，已初始化时直接返回
pub fn init_global_manager(
    host: Rc<dyn HostEvents>,
    sandbox: Rc<dyn Sandbox>,
    config: ManagerConfig,
) {
    GLOBAL_MANAGER.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(Rc::new(PageModManager::new(host, sandbox, config)));
        }
    });
}

/// 获取全局管理器
fn get_global_manager() -> PmResult<Rc<PageModManager>> {
    GLOBAL_MANAGER
        .with(|slot| slot.borrow().clone())
        .ok_or(PageModError::ManagerNotInitialized)
}

/// 在全局管理器上执行操作
///
/// 回调执行期间不持有全局槽位的借用，回调内可再次调用本模块的函数。
pub fn with_global_manager<R>(f: impl FnOnce(&PageModManager) -> R) -> PmResult<R> {
    let manager = get_global_manager()?;
    Ok(f(&manager))
}

pub fn create_mod(options: PageModOptions) -> PmResult<PageMod> {
    get_global_manager()?.create_mod(options)
}

pub fn register_mod(page_mod: &PageMod) -> PmResult<()> {
    get_global_manager()?.register_mod(page_mod)
}

pub fn unregister_mod(page_mod: &PageMod) -> PmResult<bool> {
    Ok(get_global_manager()?.unregister_mod(page_mod))
}

/// 关闭并移除全局管理器，返回此前是否已初始化
pub fn shutdown_global_manager() -> bool {
    let manager = GLOBAL_MANAGER.with(|slot| slot.borrow_mut().take());
    match manager {
        Some(manager) => {
            manager.shutdown();
            true
        }
        None => false,
    }
}
