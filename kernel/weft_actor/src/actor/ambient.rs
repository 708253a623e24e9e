//! The host context a turn hands to its machine.

use std::any::Any;
use std::sync::Arc;

use weft_kernel::{ActDef, Ambient, Completable, Env, Instr, NativeFault, Signal, Value, Var};

use crate::actor_ref::ActorRef;
use crate::address::RequestId;
use crate::errors::SpawnError;

use super::{Actor, Book, ReplyTo, Start, Trigger};

/// Owned for the duration of one `compute` call so natives can reach it
/// through `NativeCtx::ambient_as`.
pub(crate) struct TurnCtx {
    actor: Arc<Actor>,
    pub(crate) book: Book,
    reply_to: Option<ReplyTo>,
}

impl TurnCtx {
    pub(crate) fn new(actor: Arc<Actor>, book: Book, reply_to: Option<ReplyTo>) -> Self {
        TurnCtx {
            actor,
            book,
            reply_to,
        }
    }

    pub(crate) fn into_book(self) -> Book {
        self.book
    }

    pub(crate) fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    pub(crate) fn self_ref(&self) -> ActorRef {
        self.actor.actor_ref()
    }

    /// The requester of the in-flight computation.
    pub(crate) fn reply_to(&self) -> Option<&ReplyTo> {
        self.reply_to.as_ref()
    }

    /// Launch a one-shot child running `body` in `env`, whose completed
    /// `result` is sent back under a fresh request id.
    fn launch_child(
        &self,
        body: Arc<Instr>,
        env: Env,
        result: Var,
    ) -> Result<(ActorRef, RequestId), Signal> {
        let system = self
            .actor
            .system()
            .ok_or_else(|| NativeFault::from(SpawnError::SystemDown))?;
        let id = RequestId::fresh();
        let child = system.launch_child(
            self.actor.address(),
            "act",
            Start::Program {
                body,
                env,
                result,
                reply_to: Some((self.self_ref(), id)),
            },
        );
        let child_ref = child.actor_ref();
        child.start();
        Ok((child_ref, id))
    }
}

impl Ambient for TurnCtx {
    /// Lift `def` into a child actor.
    ///
    /// Complete free variables are copied. Each partial one gets a fresh
    /// cell in the child plus a trigger that syncs it once the parent's
    /// value is complete.
    fn act(&mut self, def: &Arc<ActDef>, env: &Env) -> Result<(), Signal> {
        let target = env.get(def.target())?.clone();
        let mut bindings = Vec::with_capacity(def.free().len() + 1);
        let mut pending = Vec::new();
        for ident in def.free() {
            let parent = Value::from_var(env.get(ident)?);
            match parent.check_complete() {
                Ok(value) => bindings.push((ident.clone(), Var::bound(value))),
                Err(_) => {
                    let child_var = Var::new();
                    bindings.push((ident.clone(), child_var.clone()));
                    pending.push((parent, child_var));
                }
            }
        }
        let result = Var::new();
        bindings.push((def.target().clone(), result.clone()));
        let child_env = self.actor.root_env().extend(bindings);

        let (child, id) = self.launch_child(Arc::clone(def.body()), child_env, result)?;
        tracing::debug!(
            parent = %self.actor.address(),
            child = %child.address(),
            synced = pending.len(),
            "act lifted"
        );
        self.book.children.insert(id, target);
        for (parent, child_var) in pending {
            let trigger = Trigger {
                parent,
                child_var,
                child: child.clone(),
            };
            self.book.arm(&self.actor, trigger);
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
