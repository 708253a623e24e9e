//! Handles to message recipients.
//!
//! An [`ActorRef`] is what code holds to talk to an actor or a [`Probe`].
//! Inside running programs it appears as an opaque value that selects
//! `ask`, `tell`, `stream` and `address`.
//!
//! [`Probe`]: crate::probe::Probe

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use weft_kernel::{Feature, NativeProc, OpaqueObj, Value};

use crate::address::Address;
use crate::envelope::Envelope;
use crate::errors::SendError;
use crate::natives;

/// Anything that accepts envelopes.
pub trait MessageSink: Send + Sync {
    fn address(&self) -> &Address;

    /// Enqueue `envelope`. Never blocks on the recipient's work.
    fn send(&self, envelope: Envelope) -> Result<(), SendError>;
}

#[derive(Clone)]
pub struct ActorRef(Arc<dyn MessageSink>);

impl ActorRef {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        ActorRef(sink)
    }

    #[inline]
    pub fn address(&self) -> &Address {
        self.0.address()
    }

    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.0.send(envelope)
    }

    /// Whether both handles reach the same recipient.
    pub fn ptr_eq(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This reference as a program value.
    pub fn to_value(&self) -> Value {
        Value::Opaque(Arc::new(self.clone()))
    }

    /// Recover a reference from a program value.
    pub fn from_value(value: &Value) -> Option<ActorRef> {
        match value.resolve().ok()? {
            Value::Opaque(obj) => obj.as_any().downcast_ref::<ActorRef>().cloned(),
            _ => None,
        }
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({:?})", self.address())
    }
}

impl OpaqueObj for ActorRef {
    fn type_name(&self) -> &'static str {
        "ActorRef"
    }

    fn select(&self, feature: &Feature) -> Option<Value> {
        let target = self.clone();
        let proc = match feature.as_str()? {
            "address" => return Some(Value::str(self.address().as_str())),
            "ask" => NativeProc::new("ask", 2, move |args, ctx| {
                natives::ask(&target, &args[0], &args[1], ctx)
            }),
            "tell" => NativeProc::new("tell", 1, move |args, _| natives::tell(&target, &args[0])),
            "stream" => NativeProc::new("stream", 2, move |args, ctx| {
                natives::open_stream(&target, &args[0], &args[1], ctx)
            }),
            _ => return None,
        };
        Some(Value::Proc(proc))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
