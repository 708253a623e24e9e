//! Native procedure registry.
//!
//! A `Registry` is built once by the host and passed to whatever creates
//! machines. [`Registry::root_env`] turns it into the outermost environment
//! frame, so natives are ordinary identifiers to running code.

use crate::env::Env;
use crate::errors::{KernelError, Signal};
use crate::ident::Ident;
use crate::value::{unify, NativeProc, Token, Value, Var};

/// Deliver a native's result by unifying it with an output argument.
pub fn bind_output(target: &Value, value: Value) -> Result<(), Signal> {
    unify(target, &value)?;
    Ok(())
}

#[derive(Clone, Default)]
pub struct Registry {
    natives: Vec<NativeProc>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the kernel's own natives.
    pub fn with_kernel_natives() -> Self {
        let mut registry = Self::new();
        registry
            .register(NativeProc::new("is_det", 2, |args, _| {
                bind_output(&args[1], Value::Bool(args[0].resolve().is_ok()))
            }))
            .register(NativeProc::new("to_str", 2, |args, _| {
                let text = match args[0].resolved()? {
                    Value::Str(s) => Value::Str(s),
                    other => Value::str(&other.to_string()),
                };
                bind_output(&args[1], text)
            }))
            .register(NativeProc::new("rec_size", 2, |args, _| {
                match args[0].resolved()? {
                    Value::Rec(rec) => {
                        let size = i64::try_from(rec.len())
                            .map_err(|_| KernelError::Overflow("rec_size"))?;
                        bind_output(&args[1], Value::Int(size))
                    }
                    other => Err(KernelError::type_mismatch("rec_size", &other).into()),
                }
            }))
            .register(NativeProc::new("make_token", 1, |args, _| {
                bind_output(&args[0], Value::Token(Token::fresh()))
            }));
        registry
    }

    /// Add `native`, replacing any native with the same name.
    pub fn register(&mut self, native: NativeProc) -> &mut Self {
        match self.natives.iter_mut().find(|n| n.name() == native.name()) {
            Some(existing) => *existing = native,
            None => self.natives.push(native),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&NativeProc> {
        self.natives.iter().find(|n| n.name() == name)
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    /// One frame binding every native under its name.
    pub fn root_env(&self) -> Env {
        Env::empty().extend(self.natives.iter().map(|native| {
            (
                Ident::new(native.name()),
                Var::bound(Value::Proc(native.clone())),
            )
        }))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_by_name() {
        let mut registry = Registry::new();
        registry.register(NativeProc::new("f", 1, |_, _| Ok(())));
        registry.register(NativeProc::new("f", 2, |_, _| Ok(())));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("f").map(NativeProc::arity), Some(2));
    }

    #[test]
    fn root_env_exposes_natives() {
        let registry = Registry::with_kernel_natives();
        let env = registry.root_env();
        for name in ["is_det", "to_str", "rec_size", "make_token"] {
            let var = env.get(&Ident::new(name)).unwrap();
            assert!(matches!(var.resolve(), Ok(Value::Proc(p)) if p.name() == name));
        }
    }
}
