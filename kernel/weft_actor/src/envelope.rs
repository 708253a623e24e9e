//! Messages exchanged between actors.
//!
//! Every message is an [`Envelope`]: a kind-specific [`Body`], an optional
//! request id and an optional sender. Responses carry the id of the request
//! they answer.

use std::fmt;

use weft_kernel::{Value, Var, VarId};

use crate::actor_ref::ActorRef;
use crate::address::RequestId;

/// The four message classes, in mailbox priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeKind {
    Control,
    Response,
    Request,
    Notify,
}

/// Scheduler-level instructions to an actor.
#[derive(Clone, Debug)]
pub enum Control {
    /// Continue a preempted computation.
    Resume,
    /// Terminate. In-flight and pending requests are answered with a
    /// failure.
    Stop,
    /// Bind the receiver's copy of a free variable.
    Sync { var: Var, value: Value },
    /// A cell the actor was watching has been bound.
    Bound(VarId),
}

#[derive(Clone, Debug)]
pub enum Body {
    Control(Control),
    /// Expects exactly one response.
    Request(Value),
    /// Expects a series of responses ending in `eof(more: false)`.
    Stream(Value),
    Notify(Value),
    Response(Value),
}

#[derive(Clone)]
pub struct Envelope {
    pub request_id: Option<RequestId>,
    pub sender: Option<ActorRef>,
    pub body: Body,
}

impl Envelope {
    pub fn control(control: Control) -> Self {
        Envelope {
            request_id: None,
            sender: None,
            body: Body::Control(control),
        }
    }

    /// A `stop` whose sender is answered once the actor has terminated.
    pub fn stop_from(sender: ActorRef) -> (Self, RequestId) {
        let id = RequestId::fresh();
        let envelope = Envelope {
            request_id: Some(id),
            sender: Some(sender),
            body: Body::Control(Control::Stop),
        };
        (envelope, id)
    }

    pub fn request(msg: Value, sender: ActorRef) -> (Self, RequestId) {
        let id = RequestId::fresh();
        let envelope = Envelope {
            request_id: Some(id),
            sender: Some(sender),
            body: Body::Request(msg),
        };
        (envelope, id)
    }

    pub fn stream(msg: Value, sender: ActorRef) -> (Self, RequestId) {
        let id = RequestId::fresh();
        (Envelope::stream_with_id(msg, sender, id), id)
    }

    pub(crate) fn stream_with_id(msg: Value, sender: ActorRef, id: RequestId) -> Self {
        Envelope {
            request_id: Some(id),
            sender: Some(sender),
            body: Body::Stream(msg),
        }
    }

    pub fn notify(msg: Value) -> Self {
        Envelope {
            request_id: None,
            sender: None,
            body: Body::Notify(msg),
        }
    }

    pub fn response(request_id: RequestId, value: Value) -> Self {
        Envelope {
            request_id: Some(request_id),
            sender: None,
            body: Body::Response(value),
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.body {
            Body::Control(_) => EnvelopeKind::Control,
            Body::Response(_) => EnvelopeKind::Response,
            Body::Request(_) | Body::Stream(_) => EnvelopeKind::Request,
            Body::Notify(_) => EnvelopeKind::Notify,
        }
    }

    /// The payload of a request, stream request, notify or response.
    pub fn payload(&self) -> Option<&Value> {
        match &self.body {
            Body::Request(value)
            | Body::Stream(value)
            | Body::Notify(value)
            | Body::Response(value) => Some(value),
            Body::Control(_) => None,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind())
            .field("request_id", &self.request_id)
            .field("sender", &self.sender.as_ref().map(ActorRef::address))
            .field("body", &self.body)
            .finish()
    }
}
