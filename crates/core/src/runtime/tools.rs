//! Tool Registry: holds `ToolDefinition`s and dispatches execution.
//!
//! The builtins here are thin deterministic in-memory fakes standing in for
//! a real filesystem/process backend, matching the supplemented-ambient-
//! surface note that this crate ships stubs, not production tools.
//!
//! `undo` and `actions` are registered as schema-only entries: the Chat
//! Loop dispatches them directly against the Undo Service / Action Journal
//! instead of routing through a handler here, which is how this avoids the
//! cyclic-ownership the registry would otherwise need (journal ↔ registry
//! ↔ guard stack all referencing each other).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use sa_domain::tool::ToolDefinition;

use crate::runtime::journal::ToolCategory;
use crate::runtime::undo::{ReverseHandler, ReverseHandlerRegistry};

/// Static reversal lookup for shell commands: the `exec|bash|shell`
/// category passes the undo guarantee only when this lookup finds a
/// reversal for the given command.
/// Best-effort pattern match over a handful of common idempotent pairs —
/// anything else has no reversal and falls to the approval/denial path.
pub fn static_exec_reversal(command: &str) -> Option<String> {
    let command = command.trim();
    if let Some(rest) = command.strip_prefix("mkdir ") {
        return Some(format!("rmdir {rest}"));
    }
    if let Some(rest) = command.strip_prefix("touch ") {
        return Some(format!("rm {rest}"));
    }
    if let Some(rest) = command.strip_prefix("git branch ") {
        return Some(format!("git branch -d {rest}"));
    }
    None
}

/// `{ name, description, paramSchema, category, isUndoable, reverseHint }`.
/// `definition` is the wire-facing shape sent to the LLM; the rest is
/// local metadata the guard stack and undo service consult.
#[derive(Clone)]
pub struct ToolSpec {
    pub definition: ToolDefinition,
    pub category: ToolCategory,
    pub undoable: bool,
    /// Best-effort args → reversal-command mapping, consulted by the
    /// undo-guarantee gate. `None` means "no static reversal known".
    pub reverse_hint: Option<fn(&Value) -> Option<String>>,
}

/// A tool's executable behavior.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, String>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    async fn call(&self, args: Value) -> Result<Value, String> {
        (self.0)(args)
    }
}

#[derive(Clone)]
struct FakeProcess {
    command: String,
    exit_code: i32,
    stdout: String,
}

/// In-memory state backing the builtin fakes.
struct FakeBackend {
    files: Mutex<HashMap<String, String>>,
    processes: Mutex<HashMap<u64, FakeProcess>>,
    next_pid: AtomicU64,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            next_pid: AtomicU64::new(1),
        }
    }
}

/// Reverses a `write_file` call. The fake backend keeps no version history,
/// so undo is "best effort": it removes the key rather than restoring
/// whatever was there before the write (there is no prior-value stack to
/// restore from). Redo re-applies the original write verbatim.
struct WriteFileReverseHandler {
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl ReverseHandler for WriteFileReverseHandler {
    async fn undo(&self, args: &Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field: path".to_string())?;
        self.backend.files.lock().remove(path);
        Ok(json!({"path": path, "undone": true}))
    }

    async fn redo(&self, args: &Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field: path".to_string())?
            .to_string();
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field: content".to_string())?
            .to_string();
        let bytes_written = content.len();
        self.backend.files.lock().insert(path.clone(), content);
        Ok(json!({"path": path, "bytes_written": bytes_written}))
    }
}

/// Holds every tool's schema + metadata, and dispatches execution for the
/// tools that have a registered handler.
pub struct ToolRegistry {
    specs: HashMap<String, ToolSpec>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    backend: Arc<FakeBackend>,
}

impl ToolRegistry {
    /// Register the six builtin stubs named in the supplemented ambient
    /// surface: `read_file`, `write_file`, `exec`, `process.poll`, plus
    /// schema-only entries for `undo` and `actions`.
    pub fn with_builtins() -> Self {
        let backend = Arc::new(FakeBackend::new());
        let mut registry = Self {
            specs: HashMap::new(),
            handlers: HashMap::new(),
            backend: backend.clone(),
        };

        registry.register_read_file(&backend);
        registry.register_write_file(&backend);
        registry.register_exec(&backend);
        registry.register_process_poll(&backend);
        registry.register_introspection_schema(
            "undo",
            "Undo or redo previously executed mutating tool calls.",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["undo_one", "undo_last_n", "undo_all", "redo_one", "redo_last_n", "redo_all"]},
                    "id": {"type": "integer"},
                    "n": {"type": "integer"}
                },
                "required": ["action"]
            }),
        );
        registry.register_introspection_schema(
            "actions",
            "List recorded tool-call actions from the action journal.",
            json!({
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "category": {"type": "string", "enum": ["read", "mutate", "exec", "meta"]},
                    "undoable": {"type": "boolean"}
                }
            }),
        );

        registry
    }

    fn insert(&mut self, spec: ToolSpec, handler: Option<Arc<dyn ToolHandler>>) {
        let name = spec.definition.name.clone();
        self.specs.insert(name.clone(), spec);
        if let Some(handler) = handler {
            self.handlers.insert(name, handler);
        }
    }

    fn register_introspection_schema(&mut self, name: &str, description: &str, params: Value) {
        self.insert(
            ToolSpec {
                definition: ToolDefinition {
                    name: name.to_string(),
                    description: description.to_string(),
                    parameters: params,
                },
                category: ToolCategory::Meta,
                undoable: false,
                reverse_hint: None,
            },
            None,
        );
    }

    fn register_read_file(&mut self, backend: &Arc<FakeBackend>) {
        let backend = backend.clone();
        self.insert(
            ToolSpec {
                definition: ToolDefinition {
                    name: "read_file".into(),
                    description: "Read the contents of a file from the in-memory workspace."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"path": {"type": "string"}},
                        "required": ["path"]
                    }),
                },
                category: ToolCategory::Read,
                undoable: false,
                reverse_hint: None,
            },
            Some(Arc::new(FnHandler(move |args: Value| {
                let path = args
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing required field: path".to_string())?;
                let files = backend.files.lock();
                match files.get(path) {
                    Some(content) => Ok(json!({"path": path, "content": content})),
                    None => Err(format!("no such file: {path}")),
                }
            }))),
        );
    }

    fn register_write_file(&mut self, backend: &Arc<FakeBackend>) {
        let backend = backend.clone();
        self.insert(
            ToolSpec {
                definition: ToolDefinition {
                    name: "write_file".into(),
                    description: "Write (overwrite) a file in the in-memory workspace.".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "path": {"type": "string"},
                            "content": {"type": "string"}
                        },
                        "required": ["path", "content"]
                    }),
                },
                category: ToolCategory::Mutate,
                undoable: true,
                reverse_hint: Some(|args| {
                    args.get("path")
                        .and_then(|v| v.as_str())
                        .map(|p| format!("restore previous contents of {p}"))
                }),
            },
            Some(Arc::new(FnHandler(move |args: Value| {
                let path = args
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing required field: path".to_string())?
                    .to_string();
                let content = args
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing required field: content".to_string())?
                    .to_string();
                let bytes_written = content.len();
                backend.files.lock().insert(path.clone(), content);
                Ok(json!({"path": path, "bytes_written": bytes_written}))
            }))),
        );
    }

    fn register_exec(&mut self, backend: &Arc<FakeBackend>) {
        let backend = backend.clone();
        self.insert(
            ToolSpec {
                definition: ToolDefinition {
                    name: "exec".into(),
                    description: "Start a shell command in the background and return a process id to poll.".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"command": {"type": "string"}},
                        "required": ["command"]
                    }),
                },
                category: ToolCategory::Exec,
                undoable: false,
                reverse_hint: Some(|args| {
                    args.get("command")
                        .and_then(|v| v.as_str())
                        .and_then(static_exec_reversal)
                }),
            },
            Some(Arc::new(FnHandler(move |args: Value| {
                let command = args
                    .get("command")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing required field: command".to_string())?
                    .to_string();
                let pid = backend.next_pid.fetch_add(1, Ordering::SeqCst);
                backend.processes.lock().insert(
                    pid,
                    FakeProcess {
                        command: command.clone(),
                        exit_code: 0,
                        stdout: format!("(stub) ran: {command}"),
                    },
                );
                Ok(json!({"pid": pid, "command": command, "status": "started"}))
            }))),
        );
    }

    fn register_process_poll(&mut self, backend: &Arc<FakeBackend>) {
        let backend = backend.clone();
        self.insert(
            ToolSpec {
                definition: ToolDefinition {
                    name: "process.poll".into(),
                    description: "Poll a background process started by exec for completion and output.".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"pid": {"type": "integer"}},
                        "required": ["pid"]
                    }),
                },
                category: ToolCategory::Read,
                undoable: false,
                reverse_hint: None,
            },
            Some(Arc::new(FnHandler(move |args: Value| {
                let pid = args
                    .get("pid")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| "missing required field: pid".to_string())?;
                let processes = backend.processes.lock();
                match processes.get(&pid) {
                    Some(p) => Ok(json!({
                        "pid": pid,
                        "command": p.command,
                        "done": true,
                        "exit_code": p.exit_code,
                        "stdout": p.stdout,
                    })),
                    None => Err(format!("no such process: {pid}")),
                }
            }))),
        );
    }

    /// Wire-facing schema list, in registration order, for the LLM call.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.values().map(|s| s.definition.clone()).collect()
    }

    pub fn get_spec(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invoke a tool's handler directly — callers are expected to have
    /// already run this call through the guard stack.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        match self.handlers.get(name) {
            Some(handler) => handler.call(args).await,
            None => Err(format!(
                "tool '{name}' has no executable handler (dispatched elsewhere or unknown)"
            )),
        }
    }

    /// Build the reverse-handler registry the Undo Service needs, wired
    /// against the same backend this registry's handlers mutate.
    pub fn build_reverse_handlers(&self) -> ReverseHandlerRegistry {
        let mut registry = ReverseHandlerRegistry::new();
        registry.register(
            "write_file",
            Arc::new(WriteFileReverseHandler {
                backend: self.backend.clone(),
            }),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_exec_reversal_recognizes_mkdir() {
        assert_eq!(static_exec_reversal("mkdir foo"), Some("rmdir foo".into()));
    }

    #[test]
    fn static_exec_reversal_unknown_command_is_none() {
        assert_eq!(static_exec_reversal("curl http://example.com"), None);
    }

    #[test]
    fn definitions_include_all_builtins() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        for expected in ["read_file", "write_file", "exec", "process.poll", "undo", "actions"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn undo_and_actions_have_no_handler() {
        let registry = ToolRegistry::with_builtins();
        assert!(!registry.has_handler("undo"));
        assert!(!registry.has_handler("actions"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let registry = ToolRegistry::with_builtins();
        registry
            .execute("write_file", json!({"path": "a.txt", "content": "hi"}))
            .await
            .unwrap();
        let result = registry
            .execute("read_file", json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(result["content"], "hi");
    }

    #[tokio::test]
    async fn read_missing_file_errors() {
        let registry = ToolRegistry::with_builtins();
        let err = registry
            .execute("read_file", json!({"path": "missing.txt"}))
            .await
            .unwrap_err();
        assert!(err.contains("no such file"));
    }

    #[tokio::test]
    async fn exec_then_poll() {
        let registry = ToolRegistry::with_builtins();
        let started = registry
            .execute("exec", json!({"command": "echo hi"}))
            .await
            .unwrap();
        let pid = started["pid"].clone();
        let polled = registry
            .execute("process.poll", json!({"pid": pid}))
            .await
            .unwrap();
        assert_eq!(polled["done"], true);
    }

    #[tokio::test]
    async fn poll_unknown_pid_errors() {
        let registry = ToolRegistry::with_builtins();
        let err = registry
            .execute("process.poll", json!({"pid": 9999}))
            .await
            .unwrap_err();
        assert!(err.contains("no such process"));
    }

    #[test]
    fn write_file_category_is_mutate_and_undoable() {
        let registry = ToolRegistry::with_builtins();
        let spec = registry.get_spec("write_file").unwrap();
        assert_eq!(spec.category, ToolCategory::Mutate);
        assert!(spec.undoable);
    }

    #[test]
    fn read_file_category_is_read_and_not_undoable() {
        let registry = ToolRegistry::with_builtins();
        let spec = registry.get_spec("read_file").unwrap();
        assert_eq!(spec.category, ToolCategory::Read);
        assert!(!spec.undoable);
    }
}
