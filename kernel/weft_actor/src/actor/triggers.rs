//! Cell watches and the free-variable trigger table.
//!
//! An actor learns that a cell was bound through a `Bound(id)` control
//! message sent by a bind callback. One callback is registered per watched
//! cell; the triggers waiting on that cell are kept here, keyed by id.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use weft_kernel::{Completable, Value, Var, VarId};

use crate::actor_ref::ActorRef;
use crate::address::RequestId;
use crate::envelope::{Control, Envelope};
use crate::stream::StreamState;

use super::Actor;

/// A child's copy of a free variable, waiting for the parent's value to
/// become complete.
#[derive(Clone, Debug)]
pub(crate) struct Trigger {
    pub(crate) parent: Value,
    pub(crate) child_var: Var,
    pub(crate) child: ActorRef,
}

impl Trigger {
    /// Send the sync if the parent value is complete; otherwise name the
    /// cell to wait on next.
    pub(crate) fn fire(&self) -> Result<(), Var> {
        let value = self.parent.check_complete()?;
        tracing::trace!(
            child = %self.child.address(),
            var = %self.child_var.id(),
            "sync free variable"
        );
        let sync = Control::Sync {
            var: self.child_var.clone(),
            value,
        };
        if let Err(err) = self.child.send(Envelope::control(sync)) {
            tracing::debug!(%err, "sync to finished child dropped");
        }
        Ok(())
    }
}

/// Everything a turn may read or change besides the machine.
#[derive(Default)]
pub(crate) struct Book {
    triggers: FxHashMap<VarId, Vec<Trigger>>,
    watched: FxHashSet<VarId>,
    /// Outstanding `ask`s: where each response goes.
    pub(crate) asks: FxHashMap<RequestId, Var>,
    /// Outstanding `act` children: the parent cell each result binds.
    pub(crate) children: FxHashMap<RequestId, Var>,
    pub(crate) streams: FxHashMap<RequestId, StreamState>,
}

impl Book {
    /// Arrange for a `Bound` message once `var` is bound. Idempotent per
    /// cell.
    pub(crate) fn watch(&mut self, actor: &Arc<Actor>, var: &Var) -> VarId {
        let root = var.root();
        let id = root.id();
        if self.watched.insert(id) {
            let actor = Arc::downgrade(actor);
            root.on_bind(Box::new(move |_| {
                if let Some(actor) = actor.upgrade() {
                    actor.notify_bound(id);
                }
            }));
        }
        id
    }

    /// Fire `trigger` now, or park it on the first unbound cell it reaches.
    pub(crate) fn arm(&mut self, actor: &Arc<Actor>, trigger: Trigger) {
        if let Err(pending) = trigger.fire() {
            let id = self.watch(actor, &pending);
            tracing::trace!(on = %id, child = %trigger.child.address(), "trigger registered");
            self.triggers.entry(id).or_default().push(trigger);
        }
    }

    /// A watched cell was bound: re-arm everything waiting on it.
    pub(crate) fn on_bound(&mut self, actor: &Arc<Actor>, id: VarId) {
        self.watched.remove(&id);
        for trigger in self.triggers.remove(&id).unwrap_or_default() {
            self.arm(actor, trigger);
        }
    }

    pub(crate) fn pending_triggers(&self) -> usize {
        self.triggers.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use weft_kernel::{bind, Feature, Rec};

    use super::*;
    use crate::actor::Start;
    use crate::address::Address;
    use crate::config::SystemConfig;
    use crate::envelope::Body;
    use crate::probe::Probe;
    use crate::system::ActorSystem;

    const QUIET: Duration = Duration::from_millis(100);

    fn record(name: &str, value: Value) -> Value {
        Value::Rec(Rec::new(None, vec![(Feature::str(name), value)]).unwrap())
    }

    /// An idle actor to own the watches. Its own turns only see `Bound`
    /// notices for cells it never armed.
    fn owner(system: &ActorSystem) -> Arc<Actor> {
        system
            .shared()
            .launch_child(&Address::new("owner"), "book", Start::Handlers(Value::Null))
    }

    fn syncs(child: &Probe) -> Vec<(Var, Value)> {
        let mut out = Vec::new();
        while let Some(envelope) = child.recv_timeout(QUIET) {
            if let Body::Control(Control::Sync { var, value }) = envelope.body {
                out.push((var, value));
            }
        }
        out
    }

    #[test]
    fn complete_parent_syncs_at_once() {
        let system = ActorSystem::new(SystemConfig::default().with_workers(1)).unwrap();
        let actor = owner(&system);
        let child = Probe::new("child");
        let mut book = Book::default();

        book.arm(
            &actor,
            Trigger {
                parent: record("a", Value::Int(1)),
                child_var: Var::new(),
                child: child.actor_ref(),
            },
        );

        assert_eq!(book.pending_triggers(), 0);
        assert_eq!(syncs(&child).len(), 1);
    }

    #[test]
    fn chain_of_partial_bindings_syncs_once() {
        let system = ActorSystem::new(SystemConfig::default().with_workers(1)).unwrap();
        let actor = owner(&system);
        let child = Probe::new("child");
        let mut book = Book::default();
        let inner = Var::new();
        let leaf = Var::new();
        let child_var = Var::new();

        book.arm(
            &actor,
            Trigger {
                parent: record("a", Value::Var(inner.clone())),
                child_var: child_var.clone(),
                child: child.actor_ref(),
            },
        );
        assert_eq!(book.pending_triggers(), 1);

        // Bound, but to another partial value: the trigger moves to `leaf`.
        bind(&inner, &record("b", Value::Var(leaf.clone()))).unwrap();
        book.on_bound(&actor, inner.id());
        assert_eq!(book.pending_triggers(), 1);
        assert!(syncs(&child).is_empty());

        bind(&leaf, &Value::Int(7)).unwrap();
        book.on_bound(&actor, leaf.id());
        assert_eq!(book.pending_triggers(), 0);

        let delivered = syncs(&child);
        assert_eq!(delivered.len(), 1);
        let (var, value) = &delivered[0];
        assert!(var.ptr_eq(&child_var));
        assert_eq!(value, &record("a", record("b", Value::Int(7))));

        // A repeated notice finds nothing left to fire.
        book.on_bound(&actor, leaf.id());
        assert!(syncs(&child).is_empty());
    }

    #[test]
    fn watch_registers_one_callback_per_cell() {
        let system = ActorSystem::new(SystemConfig::default().with_workers(1)).unwrap();
        let actor = owner(&system);
        let mut book = Book::default();
        let cell = Var::new();

        let first = book.watch(&actor, &cell);
        let second = book.watch(&actor, &cell);

        assert_eq!(first, second);
        assert_eq!(book.watched.len(), 1);
    }

    #[test]
    fn bind_after_termination_is_dropped() {
        let system = ActorSystem::new(SystemConfig::default().with_workers(1)).unwrap();
        let actor = owner(&system);
        let mut book = Book::default();
        let cell = Var::new();
        book.watch(&actor, &cell);

        actor.deliver(Envelope::control(Control::Stop)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !actor.state().is_terminal() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(actor.state(), crate::mailbox::ActorState::Successful);

        bind(&cell, &Value::Int(1)).unwrap();
        assert_eq!(actor.state(), crate::mailbox::ActorState::Successful);
    }
}
