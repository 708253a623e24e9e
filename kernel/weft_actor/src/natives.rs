//! Native procedures that need an actor.
//!
//! `spawn(cfg, r)`, `self(r)`, `publish(v)` and `stream(ref, msg, r)` are
//! registered by [`register`]. The `ask`, `tell` and `stream` selected from
//! an actor reference are built on the same helpers.
//!
//! All of them except `tell` require the running turn and fail with
//! `NoAmbient` elsewhere.

use std::sync::Arc;

use weft_kernel::{
    bind_output, ActorCfg, Completable, KernelError, NativeCtx, NativeFault, NativeProc, Registry,
    Signal, Value, Var,
};

use crate::actor::{Start, TurnCtx};
use crate::actor_ref::ActorRef;
use crate::envelope::Envelope;
use crate::errors::SpawnError;
use crate::stream::{StreamIter, StreamState};

/// Add the actor natives to `registry`.
pub fn register(registry: &mut Registry) {
    registry
        .register(NativeProc::new("spawn", 2, |args, ctx| {
            spawn(&args[0], &args[1], ctx)
        }))
        .register(NativeProc::new("self", 1, |args, ctx| {
            let turn = ctx.ambient_as::<TurnCtx>()?;
            bind_output(&args[0], turn.self_ref().to_value())
        }))
        .register(NativeProc::new("publish", 1, |args, ctx| publish(&args[0], ctx)))
        .register(NativeProc::new("stream", 3, |args, ctx| {
            let target = expect_actor_ref(&args[0])?;
            open_stream(&target, &args[1], &args[2], ctx)
        }));
}

/// A complete copy of `msg`, suspending until it is one.
fn complete(msg: &Value) -> Result<Value, Signal> {
    msg.check_complete().map_err(Signal::Suspend)
}

fn send_fault(err: crate::errors::SendError) -> Signal {
    NativeFault::from(err).into()
}

fn expect_actor_ref(value: &Value) -> Result<ActorRef, Signal> {
    let value = value.resolved()?;
    ActorRef::from_value(&value).ok_or_else(|| {
        KernelError::TypeMismatch {
            op: "stream",
            found: value.type_name().to_string(),
        }
        .into()
    })
}

fn expect_cfg(value: &Value) -> Result<Arc<ActorCfg>, Signal> {
    match value.resolved()? {
        Value::ActorCfg(cfg) => Ok(cfg),
        other => Err(KernelError::TypeMismatch {
            op: "spawn",
            found: other.type_name().to_string(),
        }
        .into()),
    }
}

fn spawn(cfg: &Value, result: &Value, ctx: &mut NativeCtx<'_>) -> Result<(), Signal> {
    let cfg = expect_cfg(cfg)?;
    let turn = ctx.ambient_as::<TurnCtx>()?;
    let system = turn
        .actor()
        .system()
        .ok_or_else(|| NativeFault::from(SpawnError::SystemDown))?;
    let child = system.launch_child(turn.actor().address(), "spawn", Start::Construct(cfg));
    let child_ref = child.actor_ref();
    child.start();
    tracing::debug!(parent = %turn.actor().address(), child = %child_ref.address(), "spawned");
    bind_output(result, child_ref.to_value())
}

/// Send an intermediate response to the requester of the in-flight
/// computation.
fn publish(value: &Value, ctx: &mut NativeCtx<'_>) -> Result<(), Signal> {
    let value = complete(value)?;
    let turn = ctx.ambient_as::<TurnCtx>()?;
    let Some((sender, id)) = turn.reply_to() else {
        return Err(NativeFault::new("publish", "no request in flight").into());
    };
    sender.send(Envelope::response(*id, value)).map_err(send_fault)
}

/// `ref.ask(msg, r)`: request; the response binds `r`.
pub(crate) fn ask(
    target: &ActorRef,
    msg: &Value,
    result: &Value,
    ctx: &mut NativeCtx<'_>,
) -> Result<(), Signal> {
    let msg = complete(msg)?;
    let turn = ctx.ambient_as::<TurnCtx>()?;
    let (envelope, id) = Envelope::request(msg, turn.self_ref());
    target.send(envelope).map_err(send_fault)?;
    turn.book.asks.insert(id, Var::bound(result.clone()));
    Ok(())
}

/// `ref.tell(msg)`: fire and forget. Works outside actors.
pub(crate) fn tell(target: &ActorRef, msg: &Value) -> Result<(), Signal> {
    let msg = complete(msg)?;
    target.send(Envelope::notify(msg)).map_err(send_fault)
}

/// `ref.stream(msg, r)`: stream request; `r` is bound to an iterator over
/// the responses.
pub(crate) fn open_stream(
    target: &ActorRef,
    msg: &Value,
    result: &Value,
    ctx: &mut NativeCtx<'_>,
) -> Result<(), Signal> {
    let msg = complete(msg)?;
    let turn = ctx.ambient_as::<TurnCtx>()?;
    let head = Var::new();
    let (envelope, id) = Envelope::stream(msg.clone(), turn.self_ref());
    target.send(envelope).map_err(send_fault)?;
    turn.book
        .streams
        .insert(id, StreamState::new(head.clone(), target.clone(), msg));
    bind_output(result, StreamIter::new(head).to_value())
}
