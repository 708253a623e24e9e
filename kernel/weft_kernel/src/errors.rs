//! Kernel errors and the signals instructions return.
//!
//! Executing an instruction yields `Result<(), Signal>`. `Ok(())` means the
//! instruction made progress. Each `Signal` variant is one way control can
//! leave the instruction:
//!
//! - `Suspend`: retry once the named cell is bound. Never a failure.
//! - `Error`: a kernel error; converted to an error value and thrown, unless
//!   it is fatal.
//! - `Throw`: a user-level throw of a value.
//! - `Jump`: labeled non-local exit to the matching jump-catch.
//! - `Fault`: a failure outside the kernel taxonomy, typically from a native
//!   procedure; wrapped as a failed value and thrown.

use crate::ident::Ident;
use crate::value::{Feature, UnifyError, Value, Var};

/// Errors defined by the kernel.
#[derive(Clone, Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Unify(#[from] UnifyError),

    #[error("feature `{feature}` not found in {target}")]
    FeatureNotFound { feature: Feature, target: String },

    #[error("wrong number of arguments: expected {expected}, found {found}")]
    WrongArgCount { expected: usize, found: usize },

    #[error("condition is not a boolean: {0}")]
    NotBoolean(String),

    #[error("identifier `{0}` not found")]
    IdentNotFound(Ident),

    #[error("no jump-catch for label {0}")]
    UnmatchedJump(u32),

    #[error("cannot throw unbound identifier `{0}`")]
    UnboundThrow(Ident),

    #[error("not a procedure: {0}")]
    NotProcedure(String),

    #[error("type mismatch in {op}: {found}")]
    TypeMismatch { op: &'static str, found: String },

    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("not a valid feature: {0}")]
    InvalidFeature(String),

    #[error("duplicate feature `{0}`")]
    DuplicateFeature(Feature),

    #[error("`act` requires an actor context")]
    NoAmbient,
}

impl KernelError {
    /// Stable name used as the `name` field of the error value.
    pub fn name(&self) -> &'static str {
        match self {
            KernelError::Unify(_) => "UnificationError",
            KernelError::FeatureNotFound { .. } => "FeatureNotFound",
            KernelError::WrongArgCount { .. } => "WrongArgCount",
            KernelError::NotBoolean(_) => "NotBoolean",
            KernelError::IdentNotFound(_) => "IdentNotFound",
            KernelError::UnmatchedJump(_) => "UnmatchedJump",
            KernelError::UnboundThrow(_) => "UnboundThrow",
            KernelError::NotProcedure(_) => "NotProcedure",
            KernelError::TypeMismatch { .. } => "TypeMismatch",
            KernelError::Overflow(_) => "Overflow",
            KernelError::DivisionByZero => "DivisionByZero",
            KernelError::InvalidFeature(_) => "InvalidFeature",
            KernelError::DuplicateFeature(_) => "DuplicateFeature",
            KernelError::NoAmbient => "NoAmbient",
        }
    }

    /// Fatal errors break the compiler contract and bypass `catch`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::UnmatchedJump(_))
    }

    /// The error as a catchable value: `error(name: 'Name', message: '...')`.
    pub fn to_value(&self) -> Value {
        error_value(self.name(), &self.to_string())
    }

    pub(crate) fn type_mismatch(op: &'static str, found: &Value) -> Self {
        KernelError::TypeMismatch {
            op,
            found: found.type_name().to_string(),
        }
    }
}

/// `error(name: name, message: message)`.
pub(crate) fn error_value(name: &str, message: &str) -> Value {
    Value::Rec(crate::value::Rec::from_sorted(
        Some(Value::str("error")),
        vec![
            (Feature::str("message"), Value::str(message)),
            (Feature::str("name"), Value::str(name)),
        ],
    ))
}

/// A failure outside the kernel taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct NativeFault {
    pub kind: String,
    pub message: String,
}

impl NativeFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        NativeFault {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Recover a fault from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        NativeFault::new("panic", message)
    }
}

/// Non-local outcome of executing one instruction.
#[derive(Clone, Debug)]
pub enum Signal {
    Suspend(Var),
    Error(KernelError),
    Throw(Value),
    Jump(u32),
    Fault(NativeFault),
}

impl From<KernelError> for Signal {
    fn from(err: KernelError) -> Self {
        Signal::Error(err)
    }
}

impl From<UnifyError> for Signal {
    fn from(err: UnifyError) -> Self {
        Signal::Error(KernelError::Unify(err))
    }
}

impl From<NativeFault> for Signal {
    fn from(fault: NativeFault) -> Self {
        Signal::Fault(fault)
    }
}
