//! Runtime values for the Weft kernel.
//!
//! `Value` is one closed union. Scalars are stored inline; composites are
//! `Arc`-shared and immutable, so cloning a value never copies structure.
//! The only mutable state reachable from a value lives in its variable
//! cells, which are single-assignment.
//!
//! Capabilities that differ per variant are expressed as traits:
//! - [`Entailable`]: structural equality that may need to wait on a cell
//! - [`Selectable`]: field selection
//! - [`Completable`]: replace every bound cell by its value, or name the
//!   first unbound one

mod complete;
mod entail;
mod feature;
pub mod native;
mod rec;
mod unify;
mod var;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::env::Env;
use crate::errors::{KernelError, Signal};
use crate::instr::ProcDef;
use crate::machine::NativeCtx;

pub use feature::{Feature, Token};
pub use rec::Rec;
pub use unify::{bind, unify, UnifyError};
pub use var::{BindCallback, Var, VarId};

pub(crate) use var::{LinkOutcome, SetOutcome};

/// A procedure definition closed over the cells of its free identifiers.
#[derive(Clone)]
pub struct Closure(Arc<ClosureInner>);

struct ClosureInner {
    def: Arc<ProcDef>,
    env: Env,
}

impl Closure {
    pub fn new(def: Arc<ProcDef>, env: Env) -> Self {
        Closure(Arc::new(ClosureInner { def, env }))
    }

    #[inline]
    pub fn def(&self) -> &Arc<ProcDef> {
        &self.0.def
    }

    /// The captured environment; one flat frame of free identifiers.
    #[inline]
    pub fn env(&self) -> &Env {
        &self.0.env
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

/// Signature of a host-implemented procedure.
///
/// Arguments arrive unresolved: a native that needs a value resolves it and
/// returns `Signal::Suspend` when the cell is unbound. Results are delivered
/// by binding an argument cell.
pub type NativeFn = dyn Fn(&[Value], &mut NativeCtx<'_>) -> Result<(), Signal> + Send + Sync;

/// A named host procedure with a fixed arity.
#[derive(Clone)]
pub struct NativeProc {
    name: Arc<str>,
    arity: usize,
    func: Arc<NativeFn>,
}

impl NativeProc {
    pub fn new(
        name: &str,
        arity: usize,
        func: impl Fn(&[Value], &mut NativeCtx<'_>) -> Result<(), Signal> + Send + Sync + 'static,
    ) -> Self {
        NativeProc {
            name: Arc::from(name),
            arity,
            func: Arc::new(func),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[Value], ctx: &mut NativeCtx<'_>) -> Result<(), Signal> {
        if args.len() != self.arity {
            return Err(KernelError::WrongArgCount {
                expected: self.arity,
                found: args.len(),
            }
            .into());
        }
        (self.func)(args, ctx)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &NativeProc) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

/// An actor configuration: a handlers constructor plus complete arguments.
///
/// Spawning runs the constructor with `args` followed by a fresh cell that
/// the constructor binds to its handlers record.
#[derive(Clone)]
pub struct ActorCfg {
    pub cfgtr: Closure,
    pub args: Vec<Value>,
}

/// A host object embedded in a value.
///
/// Opaque values compare by identity. Selection lets a host object expose
/// procedures, such as the `ask` and `tell` of an actor reference.
pub trait OpaqueObj: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn select(&self, _feature: &Feature) -> Option<Value> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A kernel value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Char(char),
    Str(Arc<str>),
    Bool(bool),
    Null,
    Eof,
    Token(Token),
    Rec(Rec),
    Closure(Closure),
    Proc(NativeProc),
    ActorCfgtr(Closure),
    ActorCfg(Arc<ActorCfg>),
    Opaque(Arc<dyn OpaqueObj>),
    Var(Var),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// An unlabeled tuple.
    pub fn tuple(values: Vec<Value>) -> Self {
        Value::Rec(Rec::tuple(None, values))
    }

    /// A record labeled with the string `label`.
    pub fn labeled(label: &str, fields: Vec<(Feature, Value)>) -> Result<Self, KernelError> {
        Ok(Value::Rec(Rec::new(Some(Value::str(label)), fields)?))
    }

    /// A cell's value if bound, otherwise the cell itself.
    pub fn from_var(var: &Var) -> Self {
        match var.resolve() {
            Ok(value) => value,
            Err(root) => Value::Var(root),
        }
    }

    /// Follow bound cells to a non-cell value, or return the unbound root.
    pub fn resolve(&self) -> Result<Value, Var> {
        match self {
            Value::Var(var) => var.resolve(),
            other => Ok(other.clone()),
        }
    }

    /// Like [`Value::resolve`], suspending on an unbound cell.
    pub fn resolved(&self) -> Result<Value, Signal> {
        self.resolve().map_err(Signal::Suspend)
    }

    pub fn as_rec(&self) -> Option<&Rec> {
        match self {
            Value::Rec(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, Value::Var(var) if !var.is_bound())
    }

    /// Short kind name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Char(_) => "Char",
            Value::Str(_) => "Str",
            Value::Bool(_) => "Bool",
            Value::Null => "Null",
            Value::Eof => "Eof",
            Value::Token(_) => "Token",
            Value::Rec(rec) if rec.is_tuple() => "Tuple",
            Value::Rec(_) => "Rec",
            Value::Closure(_) => "Closure",
            Value::Proc(_) => "Proc",
            Value::ActorCfgtr(_) => "ActorCfgtr",
            Value::ActorCfg(_) => "ActorCfg",
            Value::Opaque(obj) => obj.type_name(),
            Value::Var(_) => "Var",
        }
    }

    /// Identity-sensitive comparison of non-record, non-cell values.
    pub(crate) fn scalar_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Eof, Value::Eof) => true,
            (Value::Token(a), Value::Token(b)) => a == b,
            (Value::Closure(a), Value::Closure(b))
            | (Value::ActorCfgtr(a), Value::ActorCfgtr(b)) => a.ptr_eq(b),
            (Value::Proc(a), Value::Proc(b)) => a.ptr_eq(b),
            (Value::ActorCfg(a), Value::ActorCfg(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Var> for Value {
    fn from(var: Var) -> Self {
        Value::Var(var)
    }
}

/// Structural equality that may have to wait for a cell.
pub trait Entailable {
    /// `Ok(true)` if equal, `Ok(false)` if they can never be equal,
    /// `Err(Signal::Suspend)` if the answer depends on an unbound cell.
    fn entails(&self, other: &Value) -> Result<bool, Signal>;
}

/// Field selection.
pub trait Selectable {
    fn select(&self, feature: &Feature) -> Result<Value, Signal>;
}

/// Completion checking.
pub trait Completable {
    /// The value with every reachable bound cell replaced by its value, or
    /// the first unbound root cell found.
    fn check_complete(&self) -> Result<Value, Var>;
}

impl Entailable for Value {
    fn entails(&self, other: &Value) -> Result<bool, Signal> {
        entail::entails(self, other).map_err(Signal::Suspend)
    }
}

impl Selectable for Rec {
    fn select(&self, feature: &Feature) -> Result<Value, Signal> {
        match self.get(feature) {
            Some(value) => Ok(value.clone()),
            None => Err(KernelError::FeatureNotFound {
                feature: feature.clone(),
                target: Value::Rec(self.clone()).to_string(),
            }
            .into()),
        }
    }
}

impl Selectable for Value {
    fn select(&self, feature: &Feature) -> Result<Value, Signal> {
        match self.resolved()? {
            Value::Rec(rec) => rec.select(feature),
            Value::Opaque(obj) => obj.select(feature).ok_or_else(|| {
                KernelError::FeatureNotFound {
                    feature: feature.clone(),
                    target: obj.type_name().to_string(),
                }
                .into()
            }),
            other => Err(KernelError::FeatureNotFound {
                feature: feature.clone(),
                target: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

impl Completable for Value {
    fn check_complete(&self) -> Result<Value, Var> {
        complete::check_complete(self)
    }
}

impl Completable for Rec {
    fn check_complete(&self) -> Result<Value, Var> {
        complete::check_complete(&Value::Rec(self.clone()))
    }
}

/// Structural equality for resolved values.
///
/// Bound cells are followed; two unbound cells are equal when they belong to
/// the same class. Unlike [`Entailable`] this never suspends, which makes it
/// suitable for assertions on completed values. It does not terminate on
/// cyclic structures; use `entails` for those.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        let (a, b) = match (self.resolve(), other.resolve()) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(a), Err(b)) => return a.ptr_eq(&b),
            _ => return false,
        };
        match (&a, &b) {
            (Value::Rec(x), Value::Rec(y)) => {
                x.ptr_eq(y)
                    || (x.label() == y.label()
                        && x.len() == y.len()
                        && x
                            .fields()
                            .iter()
                            .zip(y.fields())
                            .all(|((f1, v1), (f2, v2))| f1 == f2 && v1 == v2))
            }
            _ => a.scalar_eq(&b),
        }
    }
}

/// Depth past which nested values print as `...`.
const DISPLAY_DEPTH: usize = 32;

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
    if depth > DISPLAY_DEPTH {
        return f.write_str("...");
    }
    match value {
        Value::Int(n) => write!(f, "{n}"),
        Value::Float(x) => write!(f, "{x:?}"),
        Value::Char(c) => write!(f, "&{c}"),
        Value::Str(s) => write!(f, "'{s}'"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Null => f.write_str("null"),
        Value::Eof => f.write_str("eof"),
        Value::Token(t) => write!(f, "<token {}>", t.id()),
        Value::Rec(rec) => {
            if let Some(label) = rec.label() {
                write_value(f, label, depth + 1)?;
            }
            let tuple = rec.is_tuple();
            f.write_str(if tuple { "[" } else { "{" })?;
            for (index, (feature, field)) in rec.fields().iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                if !tuple {
                    write!(f, "{feature}: ")?;
                }
                write_value(f, field, depth + 1)?;
            }
            f.write_str(if tuple { "]" } else { "}" })
        }
        Value::Closure(closure) => write!(f, "<proc/{}>", closure.def().params().len()),
        Value::Proc(native) => write!(f, "<native {}>", native.name()),
        Value::ActorCfgtr(_) => f.write_str("<actor constructor>"),
        Value::ActorCfg(_) => f.write_str("<actor configuration>"),
        Value::Opaque(obj) => write!(f, "<{}>", obj.type_name()),
        Value::Var(var) => match var.resolve() {
            Ok(bound) => write_value(f, &bound, depth + 1),
            Err(root) => write!(f, "{}", root.id()),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Null => f.write_str("Null"),
            Value::Eof => f.write_str("Eof"),
            Value::Token(t) => write!(f, "Token({})", t.id()),
            Value::Rec(rec) => {
                let mut out = f.debug_struct("Rec");
                out.field("label", &rec.label());
                for (feature, field) in rec.fields() {
                    out.field(&feature.to_string(), field);
                }
                out.finish()
            }
            Value::Var(var) => write!(f, "Var({var:?})"),
            other => write!(f, "{other}"),
        }
    }
}
