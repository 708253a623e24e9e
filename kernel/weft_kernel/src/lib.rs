#![allow(
    clippy::result_large_err,
    reason = "Signal carries a KernelError inline; boxing would add an allocation to every suspend"
)]
//! Weft Kernel - dataflow values and the suspendable stack machine.
//!
//! This crate provides:
//! - Single-assignment variable cells (`Var`) and the closed `Value` union
//! - Structural unification (`bind`, `unify`) and completion checks
//! - Immutable chained environments (`Env`)
//! - The instruction set (`Instr`) with precomputed free identifiers
//! - The `Machine`, which runs a bounded number of instructions and reports
//!   one of `Preempted`, `Suspended`, `Finished` or `Halted`
//! - Structured failure values (`FailedValue`)
//!
//! # Suspension
//!
//! Nothing in this crate blocks a thread. Reading an unbound cell produces
//! `Signal::Suspend` naming the cell's root; the machine restores the frame
//! and returns `ComputeResult::Suspended` so the host can retry once the cell
//! is bound.

mod env;
mod errors;
mod failure;
mod ident;
pub mod instr;
mod machine;
mod registry;
mod stack;
pub mod value;

pub use env::Env;
pub use errors::{KernelError, NativeFault, Signal};
pub use failure::{FailedValue, NativeCause};
pub use ident::Ident;
pub use instr::{ActDef, BinaryOp, Instr, Operand, Pat, ProcDef};
pub use machine::{
    Ambient, Boundary, ComputeResult, Debugger, Halt, Machine, NativeCtx, NoAmbient,
};
pub use registry::{bind_output, Registry};
pub use stack::{ensure_sufficient_stack, WORKER_STACK_SIZE};
pub use value::{
    bind, unify, ActorCfg, Closure, Completable, Entailable, Feature, NativeProc, OpaqueObj, Rec,
    Selectable, Token, UnifyError, Value, Var, VarId,
};
