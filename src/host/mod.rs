//! 宿主协作方：文档句柄、文档生命周期事件源、脚本执行沙箱
pub mod document;
pub mod events;
pub mod sandbox;

pub use self::document::{Document, DocumentId, UrlInfo};
pub use self::events::{HostEvent, HostEvents, HostHandler, MemoryHost, SubscriptionId};
pub use self::sandbox::{
    ErrorCallback, RecordingSandbox, Sandbox, SandboxHandle, SandboxRequest, SandboxRun, ScriptError,
};
