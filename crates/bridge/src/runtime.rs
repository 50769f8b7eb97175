//! Sandboxed Lua runtime with the `proto` module installed.
//!
//! The runtime captures print() output and returns it along with the
//! evaluation result. Every evaluation runs under an instruction budget, a
//! wall-clock timeout and an optional cancel token, all checked from a
//! count hook.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use mlua::{Function, HookTriggers, Lua, MultiValue, Result as LuaResult, Value, VmState};

use crate::loader::ProtoLib;

/// Default number of Lua instructions per evaluation.
pub const INSTRUCTION_LIMIT: i64 = 100_000_000;

/// Default hook interval: the budget is checked every N instructions.
pub const INSTRUCTION_HOOK_INTERVAL: u32 = 10_000;

/// Default wall-clock timeout per evaluation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on captured print() lines.
pub const MAX_OUTPUT_LINES: usize = 5_000;

/// Cancel token for script execution.
/// Set to true to signal the script should stop.
pub type CancelToken = Arc<AtomicBool>;

/// Execution limits for one runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeLimits {
    pub instruction_limit: i64,
    pub hook_interval: u32,
    pub timeout: Duration,
    /// Lua heap cap in bytes; `None` leaves the heap unbounded.
    pub memory_limit: Option<usize>,
    pub max_output_lines: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            instruction_limit: INSTRUCTION_LIMIT,
            hook_interval: INSTRUCTION_HOOK_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            memory_limit: None,
            max_output_lines: MAX_OUTPUT_LINES,
        }
    }
}

/// Result of evaluating a Lua chunk
#[derive(Debug, Clone, Default)]
pub struct ScriptResult {
    /// Lines printed via print()
    pub output: Vec<String>,
    /// String representation of returned values (if any)
    pub returned: Option<String>,
    /// Error message (if evaluation failed)
    pub error: Option<String>,
    /// Whether output was truncated due to the line cap
    pub output_truncated: bool,
    /// Whether execution was stopped due to the instruction limit
    pub instruction_limit_exceeded: bool,
    /// Whether execution was cancelled via cancel token
    pub cancelled: bool,
    /// Whether execution was stopped due to wall-clock timeout
    pub timed_out: bool,
    /// Execution stopped because the Lua heap cap was reached
    pub memory_exceeded: bool,
}

impl ScriptResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// True if a limit (not the script itself) stopped execution.
    pub fn hit_limit(&self) -> bool {
        self.instruction_limit_exceeded || self.timed_out || self.memory_exceeded
    }
}

/// Output buffer state (shared between print() and eval)
struct OutputState {
    lines: Vec<String>,
    truncated: bool,
    cap: usize,
}

impl OutputState {
    fn new(cap: usize) -> Self {
        Self {
            lines: Vec::new(),
            truncated: false,
            cap,
        }
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.truncated = false;
    }

    fn push(&mut self, line: String) {
        if self.lines.len() < self.cap {
            self.lines.push(line);
        } else {
            self.truncated = true;
        }
    }
}

/// A sandboxed Lua state with the `proto` module as a global.
pub struct ScriptRuntime {
    lua: Lua,
    output_state: Rc<RefCell<OutputState>>,
    limits: RuntimeLimits,
}

impl ScriptRuntime {
    /// Create a runtime with sandboxed globals and `proto` registered.
    pub fn new(lib: &ProtoLib, limits: RuntimeLimits) -> LuaResult<Self> {
        let lua = Lua::new();

        if let Some(bytes) = limits.memory_limit {
            lua.set_memory_limit(bytes)?;
        }

        let output_state = Rc::new(RefCell::new(OutputState::new(limits.max_output_lines)));

        // Override print() to capture output (with cap)
        {
            let state = output_state.clone();
            let print_fn = lua.create_function(move |lua, args: MultiValue| {
                let parts: Vec<String> = args.iter().map(|v| display(lua, v)).collect();
                state.borrow_mut().push(parts.join("\t"));
                Ok(())
            })?;
            lua.globals().set("print", print_fn)?;
        }

        // Sandbox: keep basic, string, table, math, utf8
        let globals = lua.globals();
        for name in ["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"] {
            globals.set(name, Value::Nil)?;
        }

        lib.register(&lua)?;
        debug!("script runtime ready ({limits:?})");

        Ok(Self {
            lua,
            output_state,
            limits,
        })
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    /// Evaluate a chunk with REPL-style behavior.
    ///
    /// If the input parses as an expression it is wrapped in `return (...)`,
    /// so typing `m.name` shows the value.
    pub fn eval(&self, input: &str) -> ScriptResult {
        let trimmed = input.trim();
        let as_expr = format!("return ({trimmed})");
        if !trimmed.is_empty() && self.lua.load(&as_expr).into_function().is_ok() {
            self.execute(&as_expr, "=eval", true, None)
        } else {
            self.execute(trimmed, "=eval", false, None)
        }
    }

    /// Run a script file's contents as statements.
    pub fn run(&self, source: &str, chunk_name: &str) -> ScriptResult {
        self.execute(source, &format!("@{chunk_name}"), false, None)
    }

    /// Like [`run`](Self::run), stopping early once `cancel` is set.
    pub fn run_cancellable(&self, source: &str, chunk_name: &str, cancel: CancelToken) -> ScriptResult {
        self.execute(source, &format!("@{chunk_name}"), false, Some(cancel))
    }

    /// The underlying Lua state, for hosts that inject their own globals
    /// (for example messages made with [`crate::wrap_shared`]).
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn execute(&self, code: &str, chunk_name: &str, is_expression: bool, cancel: Option<CancelToken>) -> ScriptResult {
        self.output_state.borrow_mut().clear();
        if code.is_empty() {
            return ScriptResult::default();
        }

        let limits = self.limits.clone();
        let start_time = Instant::now();
        let budget = Arc::new(AtomicI64::new(limits.instruction_limit));
        let was_cancelled = Arc::new(AtomicBool::new(false));
        let was_timed_out = Arc::new(AtomicBool::new(false));

        {
            let budget = budget.clone();
            let was_cancelled = was_cancelled.clone();
            let was_timed_out = was_timed_out.clone();
            let interval = limits.hook_interval.max(1);
            self.lua.set_hook(
                HookTriggers::new().every_nth_instruction(interval),
                move |_lua, _debug| {
                    if let Some(ref cancel) = cancel {
                        if cancel.load(Ordering::Relaxed) {
                            was_cancelled.store(true, Ordering::Relaxed);
                            return Err(mlua::Error::RuntimeError("execution cancelled".to_string()));
                        }
                    }

                    if start_time.elapsed() > limits.timeout {
                        was_timed_out.store(true, Ordering::Relaxed);
                        return Err(mlua::Error::RuntimeError(format!(
                            "execution timeout ({}s limit)",
                            limits.timeout.as_secs()
                        )));
                    }

                    let remaining = budget.fetch_sub(i64::from(interval), Ordering::Relaxed);
                    if remaining <= 0 {
                        Err(mlua::Error::RuntimeError(format!(
                            "instruction limit exceeded ({} instructions)",
                            limits.instruction_limit
                        )))
                    } else {
                        Ok(VmState::Continue)
                    }
                },
            );
        }

        let outcome = self.lua.load(code).set_name(chunk_name).eval::<MultiValue>();
        self.lua.remove_hook();

        let state = self.output_state.borrow();
        let mut result = ScriptResult {
            output: state.lines.clone(),
            output_truncated: state.truncated,
            ..ScriptResult::default()
        };
        drop(state);
        if result.output_truncated {
            result
                .output
                .push(format!("... output truncated ({} line limit)", self.limits.max_output_lines));
        }

        match outcome {
            Ok(values) => {
                let all_nil = values.iter().all(|v| matches!(v, Value::Nil));
                if !values.is_empty() && (is_expression || !all_nil) {
                    let parts: Vec<String> = values.iter().map(|v| display(&self.lua, v)).collect();
                    result.returned = Some(parts.join(", "));
                }
            }
            Err(e) => {
                result.cancelled = was_cancelled.load(Ordering::Relaxed);
                result.timed_out = was_timed_out.load(Ordering::Relaxed);
                result.instruction_limit_exceeded = budget.load(Ordering::Relaxed) <= 0;
                result.memory_exceeded = is_memory_error(&e);
                result.error = Some(if result.cancelled {
                    "execution cancelled".to_string()
                } else {
                    format_lua_error(&e)
                });
            }
        }
        result
    }
}

/// Convert a Lua value to a display string. Userdata goes through
/// `tostring`, so proxies show their type.
fn display(lua: &Lua, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{n:.1}")
            } else {
                n.to_string()
            }
        }
        Value::String(s) => String::from_utf8_lossy(&s.as_bytes()).into_owned(),
        Value::UserData(_) => lua
            .globals()
            .get::<Function>("tostring")
            .and_then(|tostring| tostring.call::<String>(value.clone()))
            .unwrap_or_else(|_| "userdata".to_string()),
        other => other.type_name().to_string(),
    }
}

fn is_memory_error(error: &mlua::Error) -> bool {
    match error {
        mlua::Error::MemoryError(_) => true,
        mlua::Error::CallbackError { cause, .. } => is_memory_error(cause),
        _ => false,
    }
}

/// Format a Lua error for display.
fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::MemoryError(_) => "memory limit exceeded".to_string(),
        _ => error.to_string(),
    }
}
