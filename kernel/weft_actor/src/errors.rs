//! Errors raised by the actor layer.

use weft_kernel::{FailedValue, NativeFault, Var};

use crate::address::Address;

/// A message could not be delivered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("actor `{0}` has terminated")]
    Terminated(Address),

    #[error("no actor at `{0}`")]
    UnknownAddress(Address),

    #[error("actor system is shut down")]
    SystemDown,
}

impl From<SendError> for NativeFault {
    fn from(err: SendError) -> Self {
        NativeFault::new("send", err.to_string())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("address `{0}` is already in use")]
    DuplicateAddress(Address),

    #[error("actor system is shut down")]
    SystemDown,
}

impl From<SpawnError> for NativeFault {
    fn from(err: SpawnError) -> Self {
        NativeFault::new("spawn", err.to_string())
    }
}

/// Building an image failed.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ImageError {
    #[error("constructor failed: {0}")]
    Constructor(FailedValue),

    #[error("constructor suspended on {}", .0.id())]
    Suspended(Var),

    #[error("constructor did not finish within {0} steps")]
    StepLimit(u64),

    #[error("handlers are not complete: waiting on {}", .0.id())]
    IncompleteHandlers(Var),
}
