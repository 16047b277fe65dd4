//! 隔离脚本执行沙箱接口
//!
//! 沙箱本身的隔离机制由宿主实现，这里只定义调用边界：
//! 给定文档和脚本，返回沙箱句柄，脚本运行期的未捕获错误通过 `on_error` 回传。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use super::document::{Document, DocumentId};
use crate::error::{PageModError, PmResult};
use crate::rule::ContentScript;
use crate::utils::preview_compact;

/// 注入脚本中未捕获的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptError {
    pub message: String,
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file_name: None,
            line_number: None,
            stack: None,
        }
    }

    pub fn at(mut self, file_name: impl Into<String>, line_number: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = Some(line_number);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(file) = &self.file_name {
            write!(f, " ({}:{})", file, self.line_number.unwrap_or(0))?;
        }
        Ok(())
    }
}

impl From<PageModError> for ScriptError {
    fn from(err: PageModError) -> Self {
        match err {
            PageModError::ScriptRuntime(inner) => inner,
            other => ScriptError::new(other.to_string()),
        }
    }
}

/// 脚本错误回调
pub type ErrorCallback = Rc<dyn Fn(ScriptError)>;

/// 一次脚本注入请求
pub struct SandboxRequest<'a> {
    pub document: &'a Document,
    pub script: &'a ContentScript,
    pub on_error: ErrorCallback,
}

/// 沙箱句柄，绑定到具体文档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SandboxHandle {
    id: u64,
    #[serde(skip)]
    document: DocumentId,
}

impl SandboxHandle {
    pub fn new(id: u64, document: DocumentId) -> Self {
        Self { id, document }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }
}

/// 脚本执行沙箱接口
pub trait Sandbox {
    /// 在文档中运行脚本；未捕获的脚本错误必须走 `request.on_error`
    fn run(&self, request: SandboxRequest<'_>) -> PmResult<SandboxHandle>;
}

/// 一次注入记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRun {
    pub handle: SandboxHandle,
    pub href: String,
    pub script: ContentScript,
}

/// 记录型沙箱：不执行脚本，只记录注入请求
///
/// 保留每个句柄的错误回调，可用 [`raise`](Self::raise) 模拟脚本运行期错误。
/// 回调在 [`release_document`](Self::release_document) 之前一直保留，
/// 长时间运行时应在文档结束后释放。
#[derive(Default)]
pub struct RecordingSandbox {
    next_id: Cell<u64>,
    unavailable: Cell<bool>,
    runs: RefCell<Vec<SandboxRun>>,
    // 句柄 → (所属文档, 错误回调)
    error_channels: RefCell<FxHashMap<u64, (DocumentId, ErrorCallback)>>,
}

impl RecordingSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设为不可用后，`run` 返回 `Sandbox` 错误
    pub fn set_available(&self, available: bool) {
        self.unavailable.set(!available);
    }

    pub fn runs(&self) -> Vec<SandboxRun> {
        self.runs.borrow().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.borrow().len()
    }

    /// 模拟句柄对应脚本抛出未捕获错误，返回句柄是否存在
    pub fn raise(&self, handle: SandboxHandle, error: ScriptError) -> bool {
        let callback = self
            .error_channels
            .borrow()
            .get(&handle.id())
            .map(|(_, callback)| Rc::clone(callback));
        match callback {
            Some(callback) => {
                callback(error);
                true
            }
            None => false,
        }
    }

    /// 释放文档上所有句柄的错误回调，返回释放数量
    pub fn release_document(&self, document: DocumentId) -> usize {
        let mut channels = self.error_channels.borrow_mut();
        let before = channels.len();
        channels.retain(|_, (owner, _)| *owner != document);
        before - channels.len()
    }

    /// 仍持有错误回调的句柄数量
    pub fn live_handle_count(&self) -> usize {
        self.error_channels.borrow().len()
    }
}

impl Sandbox for RecordingSandbox {
    fn run(&self, request: SandboxRequest<'_>) -> PmResult<SandboxHandle> {
        if self.unavailable.get() {
            return Err(PageModError::Sandbox(format!(
                "sandbox unavailable for {}",
                request.document.href()
            )));
        }

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = SandboxHandle::new(id, request.document.id());

        debug!(
            "sandbox#{} attached to {} script={}",
            id,
            request.document.href(),
            preview_compact(request.script.source.as_deref().unwrap_or_default(), 60)
        );

        self.runs.borrow_mut().push(SandboxRun {
            handle,
            href: request.document.href().to_string(),
            script: request.script.clone(),
        });
        self.error_channels
            .borrow_mut()
            .insert(id, (request.document.id(), request.on_error));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::UrlInfo;

    fn document() -> Document {
        Document::new(DocumentId(1), UrlInfo::parse("http://example.com/"))
    }

    #[test]
    fn test_recording_sandbox_records_runs() {
        let sandbox = RecordingSandbox::new();
        let script = ContentScript::inline("window.foo = 1;");
        let doc = document();
        let handle = sandbox
            .run(SandboxRequest {
                document: &doc,
                script: &script,
                on_error: Rc::new(|_: ScriptError| {}),
            })
            .unwrap();

        assert_eq!(handle.document(), doc.id());
        assert_eq!(sandbox.run_count(), 1);
        assert_eq!(sandbox.runs()[0].href, "http://example.com/");
        assert_eq!(sandbox.runs()[0].script, script);
    }

    #[test]
    fn test_raise_routes_to_error_callback() {
        let sandbox = RecordingSandbox::new();
        let script = ContentScript::default();
        let doc = document();
        let received = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&received);
        let handle = sandbox
            .run(SandboxRequest {
                document: &doc,
                script: &script,
                on_error: Rc::new(move |err: ScriptError| *sink.borrow_mut() = Some(err)),
            })
            .unwrap();

        let error = ScriptError::new("boom").at("content.js", 3).with_stack("@content.js:3");
        assert!(sandbox.raise(handle, error.clone()));
        assert_eq!(received.borrow().clone(), Some(error));
        assert!(!sandbox.raise(SandboxHandle::new(99, doc.id()), ScriptError::new("x")));
    }

    #[test]
    fn test_release_document_drops_error_channels() {
        let sandbox = RecordingSandbox::new();
        let script = ContentScript::default();
        let first = document();
        let second = Document::new(DocumentId(2), UrlInfo::parse("http://example.org/"));

        let mut handles = Vec::new();
        for doc in [&first, &first, &second] {
            handles.push(
                sandbox
                    .run(SandboxRequest {
                        document: doc,
                        script: &script,
                        on_error: Rc::new(|_: ScriptError| {}),
                    })
                    .unwrap(),
            );
        }
        assert_eq!(sandbox.live_handle_count(), 3);

        assert_eq!(sandbox.release_document(first.id()), 2);
        assert_eq!(sandbox.release_document(first.id()), 0);
        assert_eq!(sandbox.live_handle_count(), 1);
        assert!(!sandbox.raise(handles[0], ScriptError::new("gone")));
        assert!(sandbox.raise(handles[2], ScriptError::new("still here")));
        // 记录不受影响
        assert_eq!(sandbox.run_count(), 3);
    }

    #[test]
    fn test_unavailable_sandbox() {
        let sandbox = RecordingSandbox::new();
        sandbox.set_available(false);
        let doc = document();
        let err = sandbox
            .run(SandboxRequest {
                document: &doc,
                script: &ContentScript::default(),
                on_error: Rc::new(|_: ScriptError| {}),
            })
            .unwrap_err();
        assert!(matches!(err, PageModError::Sandbox(_)));
        assert_eq!(sandbox.run_count(), 0);
    }

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::new("x is undefined").at("mod.js", 12);
        assert_eq!(err.to_string(), "x is undefined (mod.js:12)");
        assert_eq!(ScriptError::new("plain").to_string(), "plain");
    }
}
