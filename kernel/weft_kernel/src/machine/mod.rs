//! The suspendable stack machine.
//!
//! A `Machine` owns a continuation stack and nothing else. Each call to
//! [`Machine::compute`] runs at most `budget` instructions and reports one
//! of four outcomes:
//!
//! - `Preempted`: budget exhausted, stack intact; call again to continue.
//! - `Suspended(barrier)`: an instruction needs the unbound cell `barrier`.
//!   The instruction is back on the stack and re-executes from scratch once
//!   the host calls `compute` again.
//! - `Finished`: the stack is empty.
//! - `Halted`: an error reached the bottom of the stack with no `catch`, or
//!   a fatal error bypassed them.
//!
//! Frames that only mark scope boundaries (`catch`, `jump-catch`) are
//! popped without counting against the budget.

mod cont;
mod exec;
mod operators;
mod pattern;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::env::Env;
use crate::errors::{KernelError, Signal};
use crate::failure::FailedValue;
use crate::instr::{ActDef, Instr, Operand};
use crate::value::{Value, Var, VarId};

use cont::{ContStack, Entry};

/// Host services available to running code.
///
/// The actor layer implements this to give `act` and actor natives access
/// to the current turn. Code running outside an actor uses [`NoAmbient`].
pub trait Ambient {
    /// Run `def` concurrently; its result flows back into `def.target()`.
    fn act(&mut self, def: &Arc<ActDef>, env: &Env) -> Result<(), Signal>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The ambient for machines running outside an actor. `act` fails.
pub struct NoAmbient;

impl Ambient for NoAmbient {
    fn act(&mut self, _def: &Arc<ActDef>, _env: &Env) -> Result<(), Signal> {
        Err(KernelError::NoAmbient.into())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a native procedure can reach while it runs.
pub struct NativeCtx<'a> {
    ambient: &'a mut dyn Ambient,
    env: &'a Env,
}

impl<'a> NativeCtx<'a> {
    pub fn new(ambient: &'a mut dyn Ambient, env: &'a Env) -> Self {
        NativeCtx { ambient, env }
    }

    pub fn ambient(&mut self) -> &mut dyn Ambient {
        self.ambient
    }

    /// The ambient as a concrete host type, or `NoAmbient` if it is not one.
    pub fn ambient_as<T: Any>(&mut self) -> Result<&mut T, Signal> {
        self.ambient
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| KernelError::NoAmbient.into())
    }

    /// Environment of the calling instruction.
    pub fn env(&self) -> &Env {
        self.env
    }
}

/// Observation points reported to a [`Debugger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Boundary {
    Resume,
    Suspend(VarId),
    Preempt,
    Finish,
    Halt,
}

/// Observer hooks. Must not change what the machine computes.
pub trait Debugger: Send {
    fn before_instr(&mut self, _instr: &Instr, _env: &Env, _machine: &Machine) {}

    fn at_boundary(&mut self, _boundary: &Boundary, _machine: &Machine) {}
}

/// An uncaught error.
#[derive(Clone, Debug)]
pub struct Halt {
    /// The thrown value: an `error(...)` record for kernel errors, a
    /// `FailedValue` record for native faults, or whatever user code threw.
    pub error: Value,
    /// The instruction that raised it.
    pub frame: String,
    /// The stack at the time it was raised, innermost first.
    pub stack: Vec<String>,
    /// Raised by a fatal error; no `catch` was consulted.
    pub fatal: bool,
}

impl Halt {
    /// The failure to report for an actor at `address`.
    ///
    /// A thrown failure from elsewhere becomes the cause of a new failure
    /// at `address`; one raised here is reported as-is.
    pub fn to_failed_value(&self, address: &str) -> FailedValue {
        let mut stack = Vec::with_capacity(self.stack.len() + 1);
        stack.push(self.frame.clone());
        stack.extend(self.stack.iter().cloned());
        match FailedValue::from_value(&self.error) {
            Some(mut inner) if inner.address == address => {
                if inner.stack.is_empty() {
                    inner.stack = stack;
                }
                inner
            }
            Some(inner) => FailedValue::new(address, inner.error.clone())
                .with_stack(stack)
                .with_cause(inner),
            None => FailedValue::new(address, self.error.clone()).with_stack(stack),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ComputeResult {
    Preempted,
    Suspended(Var),
    Finished,
    Halted(Halt),
}

pub struct Machine {
    stack: ContStack,
    /// Name of the owner, recorded in failures raised by native faults.
    origin: Arc<str>,
    debugger: Option<Box<dyn Debugger>>,
    steps: u64,
}

impl Machine {
    pub fn new(origin: &str) -> Self {
        Machine {
            stack: ContStack::default(),
            origin: Arc::from(origin),
            debugger: None,
            steps: 0,
        }
    }

    /// Schedule `instr` to run next.
    pub fn push(&mut self, instr: Arc<Instr>, env: Env) {
        self.stack.push(Entry::Instr { instr, env });
    }

    /// Schedule a throw of `value`, as if the next instruction raised it.
    pub fn push_throw(&mut self, value: Value, env: Env) {
        self.push(Arc::new(Instr::Throw(Operand::Value(value))), env);
    }

    /// No pending work.
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Instructions executed over the machine's lifetime.
    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    #[inline]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn set_debugger(&mut self, debugger: Option<Box<dyn Debugger>>) {
        self.debugger = debugger;
    }

    /// Drop all pending work.
    pub fn clear(&mut self) {
        self.stack = ContStack::default();
    }

    /// One line per frame, innermost first.
    pub fn stack_snapshot(&self) -> Vec<String> {
        self.stack.iter().map(Entry::summary).collect()
    }

    /// Run up to `budget` instructions. A zero budget is treated as one.
    pub fn compute(&mut self, budget: usize, ambient: &mut dyn Ambient) -> ComputeResult {
        let budget = budget.max(1);
        let mut executed = 0;
        self.notify(&Boundary::Resume);
        loop {
            let Some(entry) = self.stack.pop() else {
                self.notify(&Boundary::Finish);
                return ComputeResult::Finished;
            };
            let (instr, env) = match entry {
                Entry::Instr { instr, env } => (instr, env),
                Entry::Catch { .. } | Entry::JumpCatch(_) => continue,
            };
            if executed == budget {
                self.stack.push(Entry::Instr { instr, env });
                tracing::trace!(origin = %self.origin, executed, "preempted");
                self.notify(&Boundary::Preempt);
                return ComputeResult::Preempted;
            }
            executed += 1;
            self.steps += 1;
            self.before_instr(&instr, &env);

            let Err(signal) = self.execute(&instr, &env, ambient) else {
                continue;
            };
            if let Some(result) = self.handle_signal(signal, instr, env) {
                return result;
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal, instr: Arc<Instr>, env: Env) -> Option<ComputeResult> {
        match signal {
            Signal::Suspend(var) => {
                let barrier = var.root();
                tracing::trace!(origin = %self.origin, barrier = %barrier.id(), "suspended");
                self.stack.push(Entry::Instr { instr, env });
                self.notify(&Boundary::Suspend(barrier.id()));
                Some(ComputeResult::Suspended(barrier))
            }
            Signal::Error(err) if err.is_fatal() => {
                let stack = self.stack_snapshot();
                self.clear();
                Some(self.halt(err.to_value(), &instr, stack, true))
            }
            Signal::Error(err) => self.throw(err.to_value(), &instr),
            Signal::Throw(value) => self.throw(value, &instr),
            Signal::Fault(fault) => {
                tracing::debug!(origin = %self.origin, %fault, "native fault");
                let mut stack = vec![instr.summary()];
                stack.extend(self.stack_snapshot());
                let failed = FailedValue::from_fault(&*self.origin, &fault).with_stack(stack);
                self.push_throw(failed.to_value(), env);
                None
            }
            Signal::Jump(id) => self.jump(id, &instr),
        }
    }

    /// Unwind to the nearest `catch`, or halt.
    fn throw(&mut self, value: Value, instr: &Instr) -> Option<ComputeResult> {
        let stack = self.stack_snapshot();
        while let Some(entry) = self.stack.pop() {
            if let Entry::Catch { arg, body, env } = entry {
                let env = env.extend([(arg, Var::bound(value))]);
                self.stack.push(Entry::Instr { instr: body, env });
                return None;
            }
        }
        Some(self.halt(value, instr, stack, false))
    }

    /// Unwind to the matching `jump-catch`. A missing one is fatal.
    fn jump(&mut self, id: u32, instr: &Instr) -> Option<ComputeResult> {
        let stack = self.stack_snapshot();
        while let Some(entry) = self.stack.pop() {
            if matches!(entry, Entry::JumpCatch(found) if found == id) {
                return None;
            }
        }
        Some(self.halt(KernelError::UnmatchedJump(id).to_value(), instr, stack, true))
    }

    fn halt(&mut self, error: Value, instr: &Instr, stack: Vec<String>, fatal: bool) -> ComputeResult {
        tracing::debug!(origin = %self.origin, %error, fatal, "halted");
        self.notify(&Boundary::Halt);
        ComputeResult::Halted(Halt {
            error,
            frame: instr.summary(),
            stack,
            fatal,
        })
    }

    fn before_instr(&mut self, instr: &Instr, env: &Env) {
        if let Some(mut debugger) = self.debugger.take() {
            debugger.before_instr(instr, env, self);
            self.debugger = Some(debugger);
        }
    }

    fn notify(&mut self, boundary: &Boundary) {
        if let Some(mut debugger) = self.debugger.take() {
            debugger.at_boundary(boundary, self);
            self.debugger = Some(debugger);
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("origin", &self.origin)
            .field("depth", &self.stack.len())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
