//! One scheduling turn.

use std::sync::Arc;

use weft_kernel::{
    bind, Completable, ComputeResult, Env, FailedValue, Feature, Halt, KernelError, Selectable,
    Value, Var,
};

use crate::address::RequestId;
use crate::envelope::{Body, Control, Envelope};
use crate::mailbox::ActorState;
use crate::stream::{self, Chunk};

use super::{call, Actor, Awaits, Core, InFlight, Purpose, ReplyTo, Role, TurnCtx};

/// Whether processing may continue after a message.
enum Flow {
    Continue,
    Terminated,
}

impl Actor {
    /// Run one turn. Does nothing unless the actor is `Scheduled`.
    #[tracing::instrument(level = "trace", skip(self), fields(address = %self.address))]
    pub(crate) fn run_turn(self: &Arc<Self>) {
        let Some(batch) = self.mailbox.lock().begin_turn() else {
            return;
        };
        let mut core = self.core.lock();
        for envelope in batch {
            if let Flow::Terminated = self.process(&mut core, envelope) {
                return;
            }
        }
        self.advance(&mut core);
    }

    fn process(self: &Arc<Self>, core: &mut Core, envelope: Envelope) -> Flow {
        let Envelope {
            request_id,
            sender,
            body,
        } = envelope;
        let reply_to = sender.zip(request_id);
        match body {
            Body::Control(Control::Resume) => {}
            Body::Control(Control::Stop) => {
                self.stop(core, reply_to);
                return Flow::Terminated;
            }
            Body::Control(Control::Sync { var, value }) => {
                tracing::trace!(address = %self.address, var = %var.id(), "sync received");
                if let Err(err) = bind(&var, &value) {
                    self.interrupt(core, KernelError::from(err).to_value());
                }
            }
            Body::Control(Control::Bound(id)) => core.book.on_bound(self, id),
            Body::Response(value) => match request_id {
                Some(id) => self.on_response(core, id, value),
                None => tracing::warn!(address = %self.address, "response without request id"),
            },
            Body::Request(msg) => self.begin(core, Purpose::Ask, msg, reply_to),
            Body::Stream(msg) => self.begin(core, Purpose::Stream, msg, reply_to),
            Body::Notify(msg) => self.begin(core, Purpose::Tell, msg, reply_to),
        }
        Flow::Continue
    }

    /// Throw `error` into the in-flight computation, if there is one.
    fn interrupt(&self, core: &mut Core, error: Value) {
        if core.in_flight.is_some() {
            core.machine.push_throw(error, Env::empty());
        } else {
            tracing::debug!(address = %self.address, %error, "no computation to interrupt");
        }
    }

    fn on_response(self: &Arc<Self>, core: &mut Core, id: RequestId, value: Value) {
        if let Some(target) = core.book.asks.remove(&id) {
            if let Err(err) = bind(&target, &value) {
                self.interrupt(core, KernelError::from(err).to_value());
            }
        } else if let Some(target) = core.book.children.remove(&id) {
            self.on_child_result(core, &target, value);
        } else if let Some(mut state) = core.book.streams.remove(&id) {
            match stream::classify(&value) {
                Chunk::More => {
                    let resend = Envelope::stream_with_id(state.msg.clone(), self.actor_ref(), id);
                    match state.target.send(resend) {
                        Ok(()) => {
                            core.book.streams.insert(id, state);
                        }
                        Err(err) => {
                            let error = Value::str(&err.to_string());
                            let failure = FailedValue::new(state.target.address().as_str(), error);
                            let _ = state.close(&failure.to_value());
                        }
                    }
                }
                chunk => match state.append(chunk) {
                    Ok(true) => {
                        core.book.streams.insert(id, state);
                    }
                    Ok(false) => {}
                    Err(err) => self.interrupt(core, KernelError::from(err).to_value()),
                },
            }
        } else {
            tracing::trace!(address = %self.address, request = %id, "unmatched response");
        }
    }

    /// A child's failure is rethrown here, wrapped with this actor's
    /// address; any other result binds the parent's target.
    fn on_child_result(&self, core: &mut Core, target: &Var, value: Value) {
        if let Some(failed) = FailedValue::from_value(&value) {
            let wrapped = FailedValue::new(self.address.as_str(), failed.error.clone())
                .with_cause(failed)
                .to_value();
            if core.in_flight.is_some() {
                core.machine.push_throw(wrapped, Env::empty());
            } else {
                tracing::debug!(address = %self.address, "child failed after computation ended");
                let _ = bind(target, &wrapped);
            }
            return;
        }
        if let Err(err) = bind(target, &value) {
            self.interrupt(core, KernelError::from(err).to_value());
        }
    }

    /// Start answering a request or notify with the matching handler.
    fn begin(&self, core: &mut Core, purpose: Purpose, msg: Value, reply_to: Option<ReplyTo>) {
        let handler = match &core.role {
            Role::Handlers(Some(handlers)) => select_handler(handlers, purpose),
            _ => Err(KernelError::NotProcedure(format!(
                "actor `{}` has no handlers",
                self.address
            ))),
        };
        let handler = match handler {
            Ok(handler) => handler,
            Err(error) => {
                let failure = FailedValue::new(self.address.as_str(), error.to_value());
                self.reply(reply_to.as_ref(), failure.to_value());
                return;
            }
        };
        let result = Var::new();
        let args = match purpose {
            Purpose::Tell => vec![msg],
            _ => vec![msg, Value::Var(result.clone())],
        };
        tracing::debug!(address = %self.address, ?purpose, "handling message");
        core.machine.push(Arc::new(call(handler, args)), self.root_env.clone());
        core.in_flight = Some(InFlight {
            purpose,
            reply_to,
            result,
        });
    }

    /// Run the machine for one budget and act on the outcome.
    fn advance(self: &Arc<Self>, core: &mut Core) {
        let Some(in_flight) = core.in_flight.as_ref() else {
            self.end_turn(false, None);
            return;
        };
        let reply_to = in_flight.reply_to.clone();
        let book = std::mem::take(&mut core.book);
        let mut ctx = TurnCtx::new(Arc::clone(self), book, reply_to);
        let outcome = core.machine.compute(self.step_budget, &mut ctx);
        core.book = ctx.into_book();

        match outcome {
            ComputeResult::Preempted => {
                self.end_turn(true, Some(Envelope::control(Control::Resume)));
            }
            ComputeResult::Suspended(barrier) => {
                let id = core.book.watch(self, &barrier);
                tracing::trace!(
                    address = %self.address,
                    barrier = %id,
                    triggers = core.book.pending_triggers(),
                    "suspended"
                );
                self.end_turn(true, None);
            }
            ComputeResult::Finished => self.finish(core),
            ComputeResult::Halted(halt) => self.fail(core, &halt),
        }
    }

    /// The machine ran dry. Complete the in-flight work once its result has
    /// settled far enough.
    fn finish(self: &Arc<Self>, core: &mut Core) {
        let Some(in_flight) = core.in_flight.take() else {
            self.end_turn(false, None);
            return;
        };
        let settled = match in_flight.awaits() {
            Awaits::Nothing => Ok(Value::Null),
            Awaits::Determined => in_flight.result.resolve(),
            Awaits::Complete => Value::Var(in_flight.result.clone()).check_complete(),
        };
        let result = match settled {
            Ok(value) => value,
            Err(pending) => {
                core.book.watch(self, &pending);
                core.in_flight = Some(in_flight);
                self.end_turn(true, None);
                return;
            }
        };

        match in_flight.purpose {
            Purpose::Program => {
                self.reply(in_flight.reply_to.as_ref(), result);
                tracing::debug!(address = %self.address, "finished");
                let answer = FailedValue::new(self.address.as_str(), Value::str("terminated"));
                self.terminate(core, ActorState::Successful, &answer.to_value());
            }
            Purpose::Construct => {
                tracing::debug!(address = %self.address, "constructed");
                core.role = Role::Handlers(Some(result));
                self.end_turn(false, None);
            }
            Purpose::Ask => {
                self.reply(in_flight.reply_to.as_ref(), result);
                self.end_turn(false, None);
            }
            Purpose::Stream => {
                let closed = matches!(
                    stream::classify(&result),
                    Chunk::End | Chunk::More | Chunk::Failed(_)
                );
                self.reply(in_flight.reply_to.as_ref(), result);
                if !closed {
                    match stream::eof(false) {
                        Ok(eof) => self.reply(in_flight.reply_to.as_ref(), eof),
                        Err(err) => tracing::error!(address = %self.address, %err, "eof"),
                    }
                }
                self.end_turn(false, None);
            }
            Purpose::Tell => self.end_turn(false, None),
        }
    }

    /// An uncaught error ended the computation.
    fn fail(self: &Arc<Self>, core: &mut Core, halt: &Halt) {
        let failed = halt.to_failed_value(self.address.as_str());
        let value = failed.to_value();
        match core.in_flight.take().and_then(|in_flight| in_flight.reply_to) {
            Some(reply_to) => self.reply(Some(&reply_to), value.clone()),
            None => tracing::error!(address = %self.address, failure = %failed, "actor failed"),
        }
        self.terminate(core, ActorState::Failed, &value);
    }

    /// Handle `stop`: terminate as `Successful`, failing outstanding work.
    fn stop(self: &Arc<Self>, core: &mut Core, reply_to: Option<ReplyTo>) {
        tracing::debug!(address = %self.address, "stopping");
        let failure = FailedValue::new(self.address.as_str(), Value::str("stopped")).to_value();
        if let Some(in_flight) = core.in_flight.take() {
            self.reply(in_flight.reply_to.as_ref(), failure.clone());
        }
        self.terminate(core, ActorState::Successful, &failure);
        self.reply(reply_to.as_ref(), Value::str("stopped"));
    }

    /// Enter `state` and answer everything still queued with `answer`.
    fn terminate(&self, core: &mut Core, state: ActorState, answer: &Value) {
        core.machine.clear();
        core.in_flight = None;
        core.book = super::Book::default();
        let drained = self.mailbox.lock().terminate(state);
        tracing::debug!(address = %self.address, %state, drained = drained.len(), "terminated");
        for envelope in drained {
            match envelope.body {
                Body::Control(Control::Stop) => {
                    let reply_to = envelope.sender.zip(envelope.request_id);
                    self.reply(reply_to.as_ref(), Value::str("stopped"));
                }
                Body::Request(_) | Body::Stream(_) => {
                    let reply_to = envelope.sender.zip(envelope.request_id);
                    self.reply(reply_to.as_ref(), answer.clone());
                }
                _ => {}
            }
        }
    }

    fn reply(&self, reply_to: Option<&ReplyTo>, value: Value) {
        let Some((sender, id)) = reply_to else {
            return;
        };
        if let Err(err) = sender.send(Envelope::response(*id, value)) {
            tracing::debug!(address = %self.address, %err, "reply dropped");
        }
    }

    fn end_turn(self: &Arc<Self>, busy: bool, resume: Option<Envelope>) {
        let reschedule = self.mailbox.lock().end_turn(busy, resume);
        if reschedule {
            self.schedule();
        }
    }
}

/// The handler for `purpose`. Stream requests fall back to `ask`.
fn select_handler(handlers: &Value, purpose: Purpose) -> Result<Value, KernelError> {
    let name = match purpose {
        Purpose::Tell => "tell",
        Purpose::Stream if has_feature(handlers, "stream") => "stream",
        _ => "ask",
    };
    let feature = Feature::str(name);
    handlers.select(&feature).map_err(|_| KernelError::FeatureNotFound {
        feature,
        target: "handlers".to_string(),
    })
}

fn has_feature(value: &Value, name: &str) -> bool {
    value.as_rec().is_some_and(|rec| rec.field(name).is_some())
}
