//! Embedded script state (spec §4.3 `lua:<expr>`, §4.6, §5).
//!
//! The escape-hatch operator is named after the historical `lua:`
//! prefix, but nothing about it is Lua-specific — it just needs a small
//! expression language with reusable variable bindings. We use `rhai` (no
//! example repo in the pack embeds a scripting language; see SPEC_FULL.md
//! §3 for why `rhai` was the pick) and keep the `lua:` prefix as the
//! user-facing op name for config-file compatibility.
//!
//! Concurrency model (§5): a primary-annotation `Source` owns exactly one
//! `ScriptState`, used sequentially by whichever worker currently holds the
//! chunk. Post-annotation rules instead hand out leases from a small fixed
//! `ScriptPool` so that independent states are never shared across workers.

use std::collections::HashSet;
use std::sync::Mutex;

use rhai::{Dynamic, Engine, Scope, AST};

use crate::error::{Result, VannoError};

/// Prefix recognized in a `Source`/`PostAnnotationRule` `op` string.
pub const SCRIPT_PREFIX: &str = "lua:";

pub fn script_expr(op: &str) -> Option<&str> {
    op.strip_prefix(SCRIPT_PREFIX)
}

/// One compiled expression plus the persistent scope it reuses across
/// evaluations, and de-duplicated error logging (§7: "logged, message
/// de-duplicated to at most 3 distinct messages").
pub struct ScriptState {
    engine: Engine,
    ast: AST,
    source_expr: String,
    scope: Mutex<Scope<'static>>,
    logged_errors: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for ScriptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptState").field("source_expr", &self.source_expr).finish()
    }
}

const MAX_DISTINCT_LOGGED_ERRORS: usize = 3;

impl ScriptState {
    pub fn compile(expr: &str) -> Result<Self> {
        Self::compile_with_preamble(expr, "")
    }

    /// Compile `expr`, preceded by `preamble` (the `-lua path` preload file's
    /// contents, e.g. reusable function definitions) in the same script so
    /// its bindings are visible to `expr`. An empty preamble compiles `expr`
    /// alone as a bare expression, same as before.
    pub fn compile_with_preamble(expr: &str, preamble: &str) -> Result<Self> {
        let engine = Engine::new();
        let ast = if preamble.is_empty() {
            engine
                .compile_expression(expr)
                .map_err(|e| VannoError::Script(format!("failed to compile `{expr}`: {e}")))?
        } else {
            engine
                .compile(format!("{preamble}\n({expr})"))
                .map_err(|e| VannoError::Script(format!("failed to compile `{expr}`: {e}")))?
        };
        Ok(Self {
            engine,
            ast,
            source_expr: expr.to_string(),
            scope: Mutex::new(Scope::new()),
            logged_errors: Mutex::new(HashSet::new()),
        })
    }

    /// Bind `vars` (clearing any stale bindings from a previous evaluation so
    /// a variable missing this round never leaks a prior value — spec §4.3:
    /// "any missing field is unbound so a prior run's binding does not
    /// leak") and evaluate the expression, returning its stringified result.
    ///
    /// On a runtime failure, logs (deduplicated) and returns `None`; callers
    /// decide whether "no value" means "skip the field" or "empty string",
    /// per whether the destination is flag-typed.
    pub fn eval(&self, vars: &[(&str, Dynamic)]) -> Option<String> {
        let mut scope = self.scope.lock().expect("script scope mutex poisoned");
        scope.clear();
        for (name, value) in vars {
            scope.push(name.to_string(), value.clone());
        }
        match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast) {
            Ok(v) => Some(dynamic_to_string(&v)),
            Err(e) => {
                self.log_once(&e.to_string());
                None
            }
        }
    }

    fn log_once(&self, message: &str) {
        let mut logged = self.logged_errors.lock().expect("script error log mutex poisoned");
        if logged.len() >= MAX_DISTINCT_LOGGED_ERRORS {
            return;
        }
        if logged.insert(message.to_string()) {
            log::warn!("script `{}` failed: {}", self.source_expr, message);
        }
    }
}

fn dynamic_to_string(v: &Dynamic) -> String {
    if v.is_string() {
        v.clone().into_string().unwrap_or_default()
    } else {
        v.to_string()
    }
}

/// Interpret a coerced script result as VCF flag semantics (spec §4.3):
/// `"true"`/non-zero/non-empty maps to present, `"false"`/0/empty to absent.
pub fn as_flag(value: &str) -> bool {
    !matches!(value, "" | "false" | "0")
}

/// A small fixed pool of independent `ScriptState`s for one post-annotation
/// rule (§4.6, §5). Workers lease a state via a non-blocking try-recv over a
/// bounded channel of slot indices and return it on completion.
pub struct ScriptPool {
    states: Vec<ScriptState>,
    free: crossbeam_channel::Sender<usize>,
    free_rx: crossbeam_channel::Receiver<usize>,
    expr: String,
    preamble: String,
}

pub const DEFAULT_POOL_SIZE: usize = 8;

impl ScriptPool {
    pub fn new(expr: &str, size: usize) -> Result<Self> {
        Self::new_with_preamble(expr, size, "")
    }

    pub fn new_with_preamble(expr: &str, size: usize, preamble: &str) -> Result<Self> {
        let mut states = Vec::with_capacity(size);
        for _ in 0..size {
            states.push(ScriptState::compile_with_preamble(expr, preamble)?);
        }
        let (tx, rx) = crossbeam_channel::bounded(size);
        for i in 0..size {
            tx.send(i).expect("freshly created channel has capacity");
        }
        Ok(Self { states, free: tx, free_rx: rx, expr: expr.to_string(), preamble: preamble.to_string() })
    }

    /// Lease a state via a non-blocking try-recv over the slot-index channel.
    /// When every pooled state is checked out (concurrency exceeding the
    /// pool size), compile a one-off transient state instead of blocking —
    /// it costs a recompile but never stalls a worker thread, and is dropped
    /// rather than returned to the pool once the lease ends.
    pub fn lease(&self) -> LeasedScript<'_> {
        match self.free_rx.try_recv() {
            Ok(idx) => LeasedScript { pool: self, slot: Slot::Pooled(idx) },
            Err(_) => {
                let state = ScriptState::compile_with_preamble(&self.expr, &self.preamble)
                    .expect("script already compiled successfully once for this pool");
                LeasedScript { pool: self, slot: Slot::Transient(state) }
            }
        }
    }
}

enum Slot {
    Pooled(usize),
    Transient(ScriptState),
}

pub struct LeasedScript<'a> {
    pool: &'a ScriptPool,
    slot: Slot,
}

impl<'a> std::ops::Deref for LeasedScript<'a> {
    type Target = ScriptState;
    fn deref(&self) -> &ScriptState {
        match &self.slot {
            Slot::Pooled(idx) => &self.pool.states[*idx],
            Slot::Transient(state) => state,
        }
    }
}

impl<'a> Drop for LeasedScript<'a> {
    fn drop(&mut self) {
        if let Slot::Pooled(idx) = self.slot {
            let _ = self.pool.free.send(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_bound_variables() {
        let state = ScriptState::compile("vals[0] * 2").unwrap();
        let vals: rhai::Array = vec![Dynamic::from(21i64)];
        let out = state.eval(&[("vals", Dynamic::from(vals))]);
        assert_eq!(out, Some("42".to_string()));
    }

    #[test]
    fn missing_binding_does_not_leak_across_calls() {
        let state = ScriptState::compile("chrom").unwrap();
        let first = state.eval(&[("chrom", Dynamic::from("chr1".to_string()))]);
        assert_eq!(first, Some("chr1".to_string()));
        // Second call omits `chrom` entirely; it must not still be bound.
        let second = state.eval(&[("start", Dynamic::from(1_i64))]);
        assert!(second.is_none());
    }

    #[test]
    fn runtime_error_is_logged_and_returns_none() {
        let state = ScriptState::compile("vals[99]").unwrap();
        let vals: rhai::Array = vec![Dynamic::from(1_i64)];
        let out = state.eval(&[("vals", Dynamic::from(vals))]);
        assert_eq!(out, None);
    }

    #[test]
    fn flag_coercion_matches_spec_rules() {
        assert!(as_flag("true"));
        assert!(as_flag("1"));
        assert!(as_flag("yes"));
        assert!(!as_flag("false"));
        assert!(!as_flag("0"));
        assert!(!as_flag(""));
    }

    #[test]
    fn preamble_functions_are_visible_to_the_expression() {
        let state =
            ScriptState::compile_with_preamble("vals[0] * 2", "fn dbl(x) { x * 2 }").unwrap();
        // The preamble itself isn't invoked here, but compiling alongside it
        // must not break the trailing expression's evaluation.
        let vals: rhai::Array = vec![Dynamic::from(5i64)];
        let out = state.eval(&[("vals", Dynamic::from(vals))]);
        assert_eq!(out, Some("10".to_string()));
    }

    #[test]
    fn pool_lease_and_release_round_trips() {
        let pool = ScriptPool::new("1 + 1", 2).unwrap();
        let a = pool.lease();
        let b = pool.lease();
        drop(a);
        drop(b);
        let c = pool.lease();
        assert_eq!(c.eval(&[]), Some("2".to_string()));
    }

    #[test]
    fn lease_does_not_block_when_pool_is_exhausted() {
        let pool = ScriptPool::new("1 + 1", 1).unwrap();
        let _a = pool.lease();
        // Every pooled slot is checked out; this must return immediately
        // with a transient state rather than block on the free channel.
        let b = pool.lease();
        assert_eq!(b.eval(&[]), Some("2".to_string()));
    }
}
