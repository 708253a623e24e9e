//! Streaming responses.
//!
//! A stream request can be answered many times. Each response is one of:
//!
//! - `batch(v0, v1, ...)`: several elements at once,
//! - `eof(more: true)`: the producer has paused; the request is sent again,
//! - `eof(more: false)`: the stream is closed,
//! - a `FailedValue`: the producer failed; the stream ends with it,
//! - anything else: a single element.
//!
//! The consumer appends elements to a chain of cells, `cons(v, _)`,
//! ending in `Eof` once closed. A [`StreamIter`] walks the chain,
//! suspending on the tail until more arrives.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_kernel::{
    bind, bind_output, FailedValue, Feature, KernelError, NativeProc, OpaqueObj, Rec, Signal,
    UnifyError, Value, Var,
};

use crate::actor_ref::ActorRef;

const CONS: &str = "cons";
const BATCH: &str = "batch";
const EOF: &str = "eof";

/// One stream response, classified.
#[derive(Debug)]
pub(crate) enum Chunk {
    Items(Vec<Value>),
    More,
    End,
    Failed(Value),
}

/// Classify a response. Unbound cells count as single elements.
pub(crate) fn classify(value: &Value) -> Chunk {
    let resolved = match value.resolve() {
        Ok(resolved) => resolved,
        Err(_) => return Chunk::Items(vec![value.clone()]),
    };
    if FailedValue::is_failed_value(&resolved) {
        return Chunk::Failed(resolved);
    }
    let Value::Rec(rec) = &resolved else {
        return Chunk::Items(vec![resolved]);
    };
    match rec.label_str().as_deref() {
        Some(BATCH) if rec.is_tuple() => Chunk::Items(rec.values().cloned().collect()),
        Some(EOF) => match rec.field("more").map(Value::resolve) {
            Some(Ok(Value::Bool(true))) => Chunk::More,
            _ => Chunk::End,
        },
        _ => Chunk::Items(vec![resolved]),
    }
}

/// `eof(more: more)`.
pub fn eof(more: bool) -> Result<Value, KernelError> {
    Value::labeled(EOF, vec![(Feature::str("more"), Value::Bool(more))])
}

/// `batch(v0, v1, ...)`.
pub fn batch(values: Vec<Value>) -> Value {
    Value::Rec(Rec::tuple(Some(Value::str(BATCH)), values))
}

/// Consumer-side state of one open stream.
pub(crate) struct StreamState {
    /// The unbound end of the chain.
    tail: Var,
    pub(crate) target: ActorRef,
    /// The request, resent on `eof(more: true)`.
    pub(crate) msg: Value,
}

impl StreamState {
    pub(crate) fn new(head: Var, target: ActorRef, msg: Value) -> Self {
        StreamState {
            tail: head,
            target,
            msg,
        }
    }

    /// Extend the chain. Returns whether the stream is still open.
    pub(crate) fn append(&mut self, chunk: Chunk) -> Result<bool, UnifyError> {
        match chunk {
            Chunk::Items(items) => {
                for item in items {
                    let next = Var::new();
                    bind(&self.tail, &cons(item, Value::Var(next.clone())))?;
                    self.tail = next;
                }
                Ok(true)
            }
            Chunk::More => Ok(true),
            Chunk::End => {
                self.close(&Value::Eof)?;
                Ok(false)
            }
            Chunk::Failed(failure) => {
                self.close(&failure)?;
                Ok(false)
            }
        }
    }

    /// Terminate the chain with `end`.
    pub(crate) fn close(&self, end: &Value) -> Result<(), UnifyError> {
        bind(&self.tail, end)
    }
}

/// `cons(head, tail)`.
fn cons(head: Value, tail: Value) -> Value {
    Value::Rec(Rec::tuple(Some(Value::str(CONS)), vec![head, tail]))
}

/// What [`StreamIter::poll`] found.
#[derive(Clone, Debug)]
pub enum StreamPoll {
    Item(Value),
    /// Nothing yet; the cell that the next element will bind.
    Pending(Var),
    End,
    Failed(Value),
}

/// A cursor over a stream's chain of cells.
///
/// In programs it selects `next(r)`, which binds `r` to the next element or
/// to `Eof` once the stream has ended, suspends while nothing has arrived,
/// and throws the producer's failure.
#[derive(Clone)]
pub struct StreamIter {
    cursor: Arc<Mutex<Var>>,
}

impl StreamIter {
    pub fn new(head: Var) -> Self {
        StreamIter {
            cursor: Arc::new(Mutex::new(head)),
        }
    }

    /// Take the next element if it has arrived.
    pub fn poll(&self) -> StreamPoll {
        let mut cursor = self.cursor.lock();
        let node = match cursor.resolve() {
            Ok(node) => node,
            Err(pending) => return StreamPoll::Pending(pending),
        };
        if FailedValue::is_failed_value(&node) {
            return StreamPoll::Failed(node);
        }
        match &node {
            Value::Rec(rec) if rec.label_str().as_deref() == Some(CONS) => {
                match (rec.get(&Feature::Int(0)), rec.get(&Feature::Int(1))) {
                    (Some(head), Some(tail)) => {
                        let head = head.clone();
                        *cursor = Var::bound(tail.clone());
                        StreamPoll::Item(head)
                    }
                    _ => StreamPoll::Failed(node.clone()),
                }
            }
            _ => StreamPoll::End,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Opaque(Arc::new(self.clone()))
    }

    fn next(&self, target: &Value) -> Result<(), Signal> {
        match self.poll() {
            StreamPoll::Item(item) => bind_output(target, item),
            StreamPoll::Pending(cell) => Err(Signal::Suspend(cell)),
            StreamPoll::End => bind_output(target, Value::Eof),
            StreamPoll::Failed(failure) => Err(Signal::Throw(failure)),
        }
    }
}

impl fmt::Debug for StreamIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamIter({})", self.cursor.lock().id())
    }
}

impl OpaqueObj for StreamIter {
    fn type_name(&self) -> &'static str {
        "StreamIter"
    }

    fn select(&self, feature: &Feature) -> Option<Value> {
        if feature.as_str()? != "next" {
            return None;
        }
        let iter = self.clone();
        Some(Value::Proc(NativeProc::new("next", 1, move |args, _| {
            iter.next(&args[0])
        })))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
