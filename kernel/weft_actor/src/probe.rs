//! An endpoint for code outside the actor system.
//!
//! A [`Probe`] has an address and can appear as the sender of requests, so
//! actors answer it like any other actor. Everything it receives lands on a
//! channel the owner reads from.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use weft_kernel::Value;

use crate::actor_ref::{ActorRef, MessageSink};
use crate::address::{Address, RequestId};
use crate::envelope::{Body, Envelope};
use crate::errors::SendError;
use crate::stream::{classify, Chunk};

struct ProbeSink {
    address: Address,
    inbox: Sender<Envelope>,
}

impl MessageSink for ProbeSink {
    fn address(&self) -> &Address {
        &self.address
    }

    fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.inbox
            .send(envelope)
            .map_err(|_| SendError::Terminated(self.address.clone()))
    }
}

pub struct Probe {
    sink: Arc<ProbeSink>,
    received: Receiver<Envelope>,
    /// Envelopes read while looking for a specific response.
    backlog: Mutex<VecDeque<Envelope>>,
}

impl Probe {
    pub fn new(address: impl Into<Address>) -> Self {
        let (inbox, received) = channel::unbounded();
        Probe {
            sink: Arc::new(ProbeSink {
                address: address.into(),
                inbox,
            }),
            received,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    pub fn address(&self) -> &Address {
        &self.sink.address
    }

    pub fn actor_ref(&self) -> ActorRef {
        ActorRef::new(Arc::clone(&self.sink) as Arc<dyn MessageSink>)
    }

    pub fn ask(&self, target: &ActorRef, msg: Value) -> Result<RequestId, SendError> {
        let (envelope, id) = Envelope::request(msg, self.actor_ref());
        target.send(envelope)?;
        Ok(id)
    }

    pub fn tell(&self, target: &ActorRef, msg: Value) -> Result<(), SendError> {
        target.send(Envelope::notify(msg))
    }

    pub fn stream(&self, target: &ActorRef, msg: Value) -> Result<RequestId, SendError> {
        let (envelope, id) = Envelope::stream(msg, self.actor_ref());
        target.send(envelope)?;
        Ok(id)
    }

    /// Stop `target`; the acknowledgement arrives under the returned id.
    pub fn stop(&self, target: &ActorRef) -> Result<RequestId, SendError> {
        let (envelope, id) = Envelope::stop_from(self.actor_ref());
        target.send(envelope)?;
        Ok(id)
    }

    /// The next envelope, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        if let Some(envelope) = self.backlog.lock().pop_front() {
            return Some(envelope);
        }
        self.received.recv_timeout(timeout).ok()
    }

    /// The payload of the next response to `id`, waiting up to `timeout`.
    /// Other envelopes are kept for later calls.
    pub fn response(&self, id: RequestId, timeout: Duration) -> Option<Value> {
        if let Some(value) = self.take_backlogged(id) {
            return Some(value);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.received.recv_timeout(remaining) {
                Ok(envelope) if is_response_to(&envelope, id) => {
                    return envelope.payload().cloned();
                }
                Ok(envelope) => self.backlog.lock().push_back(envelope),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Send a stream request and collect its elements until the stream
    /// closes. Pauses (`eof(more: true)`) resend the request. A producer
    /// failure ends the list as its last element.
    pub fn collect_stream(
        &self,
        target: &ActorRef,
        msg: Value,
        timeout: Duration,
    ) -> Result<Vec<Value>, SendError> {
        let mut id = self.stream(target, msg.clone())?;
        let mut items = Vec::new();
        while let Some(value) = self.response(id, timeout) {
            match classify(&value) {
                Chunk::Items(chunk) => items.extend(chunk),
                Chunk::More => id = self.stream(target, msg.clone())?,
                Chunk::End => break,
                Chunk::Failed(failure) => {
                    items.push(failure);
                    break;
                }
            }
        }
        Ok(items)
    }

    fn take_backlogged(&self, id: RequestId) -> Option<Value> {
        let mut backlog = self.backlog.lock();
        let index = backlog.iter().position(|envelope| is_response_to(envelope, id))?;
        backlog.remove(index)?.payload().cloned()
    }
}

fn is_response_to(envelope: &Envelope, id: RequestId) -> bool {
    matches!(envelope.body, Body::Response(_)) && envelope.request_id == Some(id)
}
