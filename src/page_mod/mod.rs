//! PageMod 模块：页面修改描述与其事件
pub mod events;
pub mod page_mod;

pub use self::events::{AttachEvent, AttachListener, ErrorEvent, ErrorListener, ListenerId};
pub use self::page_mod::{ModId, PageMod};
pub(crate) use self::page_mod::ModContext;
