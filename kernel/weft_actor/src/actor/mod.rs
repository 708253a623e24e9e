//! Actors: a mailbox, one machine and the bookkeeping that connects them.
//!
//! An actor is driven entirely by messages. A worker that picks up a
//! `Scheduled` actor runs one turn ([`Actor::run_turn`]): it takes the next
//! batch from the mailbox, processes it, and runs the machine for one step
//! budget if a computation is in flight.
//!
//! Two roles exist:
//! - one-shot actors (`act` children and host programs) run a single
//!   computation and terminate when it finishes;
//! - handler actors run a constructor once and then answer each request by
//!   applying the matching handler, returning to `Waiting` in between.

mod ambient;
mod triggers;
mod turn;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use weft_kernel::{Env, Instr, Machine, Operand, Value, Var, VarId};

use crate::actor_ref::{ActorRef, MessageSink};
use crate::address::{Address, RequestId};
use crate::envelope::{Control, Envelope};
use crate::errors::SendError;
use crate::image;
use crate::mailbox::{ActorState, Delivery, Mailbox};
use crate::system::SystemShared;

pub(crate) use ambient::TurnCtx;
pub(crate) use triggers::{Book, Trigger};

/// Who answers once the in-flight computation completes.
pub(crate) type ReplyTo = (ActorRef, RequestId);

/// Why the machine is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Purpose {
    /// A one-shot body; the actor terminates when it finishes.
    Program,
    /// The constructor of a handler actor; `result` receives the handlers.
    Construct,
    Ask,
    Stream,
    Tell,
}

pub(crate) struct InFlight {
    pub(crate) purpose: Purpose,
    pub(crate) reply_to: Option<ReplyTo>,
    pub(crate) result: Var,
}

/// What `result` must reach before the in-flight work completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Awaits {
    Nothing,
    /// Bound to a value whose fields may still be unbound cells.
    Determined,
    Complete,
}

impl InFlight {
    /// Handlers may close over actor-local cells, so a constructor only
    /// waits for the handlers record itself. Answers are sent complete.
    fn awaits(&self) -> Awaits {
        match self.purpose {
            Purpose::Tell => Awaits::Nothing,
            Purpose::Program if self.reply_to.is_none() => Awaits::Nothing,
            Purpose::Construct => Awaits::Determined,
            Purpose::Program | Purpose::Ask | Purpose::Stream => Awaits::Complete,
        }
    }
}

pub(crate) enum Role {
    OneShot,
    /// `None` until the constructor has bound the handlers record.
    Handlers(Option<Value>),
}

/// How a new actor begins.
pub(crate) enum Start {
    Program {
        body: Arc<Instr>,
        env: Env,
        result: Var,
        reply_to: Option<ReplyTo>,
    },
    Construct(Arc<weft_kernel::ActorCfg>),
    Handlers(Value),
}

/// State owned by the actor's own turns.
struct Core {
    machine: Machine,
    role: Role,
    in_flight: Option<InFlight>,
    book: Book,
}

pub(crate) struct Actor {
    address: Address,
    mailbox: Mutex<Mailbox>,
    core: Mutex<Core>,
    system: Weak<SystemShared>,
    me: Weak<Actor>,
    root_env: Env,
    step_budget: usize,
    worker: usize,
}

impl Actor {
    /// Create an actor. Nothing runs until [`Actor::start`].
    pub(crate) fn new(
        address: Address,
        system: &Arc<SystemShared>,
        worker: usize,
        start: Start,
    ) -> Arc<Actor> {
        let root_env = system.root_env().clone();
        let mut machine = Machine::new(address.as_str());
        let (role, in_flight) = match start {
            Start::Program {
                body,
                env,
                result,
                reply_to,
            } => {
                machine.push(body, env);
                let in_flight = InFlight {
                    purpose: Purpose::Program,
                    reply_to,
                    result,
                };
                (Role::OneShot, Some(in_flight))
            }
            Start::Construct(cfg) => {
                let handlers = Var::new();
                machine.push(
                    Arc::new(image::constructor_call(&cfg, &handlers)),
                    root_env.clone(),
                );
                let in_flight = InFlight {
                    purpose: Purpose::Construct,
                    reply_to: None,
                    result: handlers,
                };
                (Role::Handlers(None), Some(in_flight))
            }
            Start::Handlers(handlers) => (Role::Handlers(Some(handlers)), None),
        };
        let busy = in_flight.is_some();
        Arc::new_cyclic(|me| Actor {
            address,
            mailbox: Mutex::new(Mailbox::new(busy)),
            core: Mutex::new(Core {
                machine,
                role,
                in_flight,
                book: Book::default(),
            }),
            system: Arc::downgrade(system),
            me: me.clone(),
            root_env,
            step_budget: system.config().step_budget,
            worker,
        })
    }

    /// Schedule the initial computation, if any.
    pub(crate) fn start(self: &Arc<Self>) {
        if self.core.lock().in_flight.is_some() {
            let _ = self.deliver(Envelope::control(Control::Resume));
        }
    }

    #[inline]
    pub(crate) fn address(&self) -> &Address {
        &self.address
    }

    #[inline]
    pub(crate) fn worker(&self) -> usize {
        self.worker
    }

    pub(crate) fn state(&self) -> ActorState {
        self.mailbox.lock().state()
    }

    pub(crate) fn actor_ref(self: &Arc<Self>) -> ActorRef {
        ActorRef::new(Arc::clone(self) as Arc<dyn MessageSink>)
    }

    pub(crate) fn system(&self) -> Option<Arc<SystemShared>> {
        self.system.upgrade()
    }

    pub(crate) fn root_env(&self) -> &Env {
        &self.root_env
    }

    /// Enqueue `envelope`, handing the actor to a worker if it was idle.
    pub(crate) fn deliver(self: &Arc<Self>, envelope: Envelope) -> Result<(), SendError> {
        let delivery = self.mailbox.lock().push(envelope);
        match delivery {
            Delivery::Queued => Ok(()),
            Delivery::Schedule => {
                self.schedule();
                Ok(())
            }
            Delivery::Rejected(envelope) => {
                tracing::warn!(
                    address = %self.address,
                    kind = ?envelope.kind(),
                    "send to terminated actor rejected"
                );
                Err(SendError::Terminated(self.address.clone()))
            }
        }
    }

    /// Tell the actor a watched cell was bound. Notices may race with
    /// termination, so a rejection is expected and not reported.
    pub(crate) fn notify_bound(self: &Arc<Self>, id: VarId) {
        let delivery = self
            .mailbox
            .lock()
            .push(Envelope::control(Control::Bound(id)));
        match delivery {
            Delivery::Queued => {}
            Delivery::Schedule => self.schedule(),
            Delivery::Rejected(_) => {
                tracing::trace!(address = %self.address, var = %id, "bound notice after termination");
            }
        }
    }

    fn schedule(self: &Arc<Self>) {
        match self.system.upgrade() {
            Some(system) => system.schedule(Arc::clone(self)),
            None => tracing::debug!(address = %self.address, "system gone; not scheduled"),
        }
    }
}

impl MessageSink for Actor {
    fn address(&self) -> &Address {
        &self.address
    }

    fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        match self.me.upgrade() {
            Some(me) => me.deliver(envelope),
            None => Err(SendError::Terminated(self.address.clone())),
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

/// `Apply` of `callee` to literal arguments.
pub(crate) fn call(callee: Value, args: Vec<Value>) -> Instr {
    Instr::Apply {
        callee: Operand::Value(callee),
        args: args.into_iter().map(Operand::Value).collect(),
    }
}
