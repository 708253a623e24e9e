//! Stack budget for machines and the value walks they trigger.
//!
//! The machine keeps its continuation on the heap, so running a program
//! never recurses. What does recurse is structural work on values:
//! unification, entailment, completion checks, pattern matching and native
//! conversion. Programs can build records nested far deeper than a worker
//! thread's stack allows, so each of those steps goes through
//! [`ensure_sufficient_stack`].
//!
//! A walk frame is a few hundred bytes, so the red zone is small and new
//! segments are modest. Worker threads start with [`WORKER_STACK_SIZE`]
//! and grow from there.

/// Remaining stack below which a new segment is allocated.
const RED_ZONE: usize = 32 * 1024;

/// Size of each new segment. Enough for a few thousand nested fields.
const SEGMENT_SIZE: usize = 512 * 1024;

/// Initial stack of a thread that runs machines.
pub const WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Run one step of a value walk, growing the stack first if it is low.
#[cfg(not(target_arch = "wasm32"))]
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

#[cfg(target_arch = "wasm32")]
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
