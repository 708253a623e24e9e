//! Actor images: constructors run once, handlers reused.

use std::sync::Arc;

use weft_kernel::{
    ActorCfg, Completable, ComputeResult, Env, Instr, Machine, NoAmbient, Value, Var,
};

use crate::actor::call;
use crate::errors::ImageError;

/// Steps a constructor may take while building an image.
pub const IMAGE_STEP_LIMIT: u64 = 1_000_000;

/// Complete handlers produced by running a constructor once.
///
/// Spawning from an image skips the constructor; every instance shares the
/// same handler values.
#[derive(Clone, Debug)]
pub struct ActorImage {
    handlers: Value,
}

impl ActorImage {
    pub fn handlers(&self) -> &Value {
        &self.handlers
    }
}

/// Apply the constructor of `cfg` to its arguments and `handlers`.
pub(crate) fn constructor_call(cfg: &ActorCfg, handlers: &Var) -> Instr {
    let mut args = cfg.args.clone();
    args.push(Value::Var(handlers.clone()));
    call(Value::Closure(cfg.cfgtr.clone()), args)
}

/// Run the constructor of `cfg` to completion on the calling thread.
///
/// The constructor runs outside any actor, so it may not use `act` or the
/// actor natives, and it must not wait on cells nothing else will bind.
pub(crate) fn build(
    cfg: &ActorCfg,
    root_env: &Env,
    budget: usize,
) -> Result<ActorImage, ImageError> {
    let handlers = Var::new();
    let mut machine = Machine::new("image");
    machine.push(Arc::new(constructor_call(cfg, &handlers)), root_env.clone());
    loop {
        match machine.compute(budget, &mut NoAmbient) {
            ComputeResult::Finished => break,
            ComputeResult::Preempted if machine.steps_executed() >= IMAGE_STEP_LIMIT => {
                return Err(ImageError::StepLimit(IMAGE_STEP_LIMIT));
            }
            ComputeResult::Preempted => {}
            ComputeResult::Suspended(barrier) => return Err(ImageError::Suspended(barrier)),
            ComputeResult::Halted(halt) => {
                return Err(ImageError::Constructor(halt.to_failed_value("image")));
            }
        }
    }
    let handlers = Value::Var(handlers)
        .check_complete()
        .map_err(ImageError::IncompleteHandlers)?;
    tracing::debug!(steps = machine.steps_executed(), "image built");
    Ok(ActorImage { handlers })
}
