//! The kernel instruction set.
//!
//! Instruction graphs are produced by a front-end compiler and are immutable
//! once built. Children are `Arc`-shared so the machine can push a subtree
//! onto its continuation stack without copying.
//!
//! Procedure and `act` definitions compute their free identifiers once, at
//! construction. The machine uses them to capture closure environments and
//! the actor layer uses them to lift an `act` body into a child actor.

pub mod build;
mod free;


use std::fmt;
use std::sync::Arc;

use crate::ident::Ident;
use crate::value::{Feature, Value};

/// An instruction argument: a variable in scope or a literal value.
#[derive(Clone, Debug)]
pub enum Operand {
    Ident(Ident),
    Value(Value),
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Ident(Ident::new(name))
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Ident(ident) => write!(f, "{ident}"),
            Operand::Value(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A `case` pattern.
#[derive(Clone, Debug)]
pub enum Pat {
    /// `_`: matches anything, binds nothing.
    Skip,
    /// Binds the matched value to a fresh identifier.
    Ident(Ident),
    /// `~x`: matches the current value of an identifier already in scope.
    Escaped(Ident),
    Literal(Value),
    /// Record or tuple pattern. `open` allows fields beyond those listed
    /// (the trailing `...`). A `None` label matches only unlabeled records.
    Rec {
        label: Option<Value>,
        fields: Vec<(Feature, Pat)>,
        open: bool,
    },
}

impl Pat {
    /// Identifiers this pattern binds, in order.
    pub fn bound_idents(&self) -> Vec<Ident> {
        let mut out = Vec::new();
        self.collect_bound(&mut out);
        out
    }

    fn collect_bound(&self, out: &mut Vec<Ident>) {
        match self {
            Pat::Ident(ident) => out.push(ident.clone()),
            Pat::Rec { fields, .. } => {
                for (_, pat) in fields {
                    pat.collect_bound(out);
                }
            }
            Pat::Skip | Pat::Escaped(_) | Pat::Literal(_) => {}
        }
    }
}

/// A procedure definition: formal parameters and body.
#[derive(Debug)]
pub struct ProcDef {
    params: Box<[Ident]>,
    body: Arc<Instr>,
    free: Box<[Ident]>,
}

impl ProcDef {
    pub fn new(params: Vec<Ident>, body: Arc<Instr>) -> Self {
        let free = free::free_idents(&params, &body);
        ProcDef {
            params: params.into_boxed_slice(),
            body,
            free: free.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn params(&self) -> &[Ident] {
        &self.params
    }

    #[inline]
    pub fn body(&self) -> &Arc<Instr> {
        &self.body
    }

    /// Identifiers the body uses that are neither parameters nor declared
    /// inside it.
    #[inline]
    pub fn free(&self) -> &[Ident] {
        &self.free
    }
}

/// A block to run concurrently in a child actor. The child binds its copy
/// of `target`; the result flows back to the parent's `target`.
#[derive(Debug)]
pub struct ActDef {
    body: Arc<Instr>,
    target: Ident,
    free: Box<[Ident]>,
}

impl ActDef {
    pub fn new(body: Arc<Instr>, target: Ident) -> Self {
        let free = free::free_idents(std::slice::from_ref(&target), &body);
        ActDef {
            body,
            target,
            free: free.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn body(&self) -> &Arc<Instr> {
        &self.body
    }

    #[inline]
    pub fn target(&self) -> &Ident {
        &self.target
    }

    /// Free identifiers of the body, excluding `target`.
    #[inline]
    pub fn free(&self) -> &[Ident] {
        &self.free
    }
}

#[derive(Debug)]
pub enum Instr {
    /// Unify two literal values.
    BindCompleteToComplete { left: Value, right: Value },
    /// Unify an identifier's cell with a literal value.
    BindCompleteToIdent { value: Value, ident: Ident },
    /// Unify two identifiers' cells.
    BindIdentToIdent { left: Ident, right: Ident },
    Binary {
        op: BinaryOp,
        left: Operand,
        right: Operand,
        target: Ident,
    },
    Negate { arg: Operand, target: Ident },
    Not { arg: Operand, target: Ident },
    /// Features are operands so that computed features are possible; they
    /// must resolve to a scalar feature value.
    CreateRec {
        label: Option<Operand>,
        fields: Vec<(Operand, Operand)>,
        target: Ident,
    },
    CreateTuple {
        label: Option<Operand>,
        values: Vec<Operand>,
        target: Ident,
    },
    CreateProc { def: Arc<ProcDef>, target: Ident },
    /// An actor constructor. Applying it to complete arguments yields an
    /// actor configuration; its last parameter receives the handlers.
    CreateActorCfgtr { def: Arc<ProcDef>, target: Ident },
    If { cond: Operand, then: Arc<Instr> },
    IfElse {
        cond: Operand,
        then: Arc<Instr>,
        otherwise: Arc<Instr>,
    },
    Case {
        arg: Operand,
        pat: Pat,
        body: Arc<Instr>,
        otherwise: Option<Arc<Instr>>,
    },
    Select {
        rec: Operand,
        feature: Operand,
        target: Ident,
    },
    SelectAndApply {
        rec: Operand,
        feature: Feature,
        args: Vec<Operand>,
    },
    Apply { callee: Operand, args: Vec<Operand> },
    Seq(Vec<Arc<Instr>>),
    /// Introduce fresh unbound cells for `idents` in `body`.
    Local { idents: Vec<Ident>, body: Arc<Instr> },
    Try {
        body: Arc<Instr>,
        catch_arg: Ident,
        catch_body: Arc<Instr>,
    },
    Throw(Operand),
    JumpCatch { id: u32, body: Arc<Instr> },
    JumpThrow(u32),
    /// Hand a block to the ambient actor context.
    Act(Arc<ActDef>),
    Skip,
}

impl Instr {
    /// One-line description for stack snapshots and tracing.
    pub fn summary(&self) -> String {
        match self {
            Instr::BindCompleteToComplete { left, right } => format!("{left} = {right}"),
            Instr::BindCompleteToIdent { value, ident } => format!("{ident} = {value}"),
            Instr::BindIdentToIdent { left, right } => format!("{left} = {right}"),
            Instr::Binary {
                op,
                left,
                right,
                target,
            } => format!("{target} = {left} {} {right}", op.symbol()),
            Instr::Negate { arg, target } => format!("{target} = -{arg}"),
            Instr::Not { arg, target } => format!("{target} = !{arg}"),
            Instr::CreateRec { target, fields, .. } => {
                format!("{target} = rec/{}", fields.len())
            }
            Instr::CreateTuple { target, values, .. } => {
                format!("{target} = tuple/{}", values.len())
            }
            Instr::CreateProc { def, target } => format!("{target} = proc/{}", def.params().len()),
            Instr::CreateActorCfgtr { target, .. } => format!("{target} = actor"),
            Instr::If { cond, .. } => format!("if {cond}"),
            Instr::IfElse { cond, .. } => format!("if {cond} else"),
            Instr::Case { arg, .. } => format!("case {arg}"),
            Instr::Select {
                rec,
                feature,
                target,
            } => format!("{target} = {rec}.{feature}"),
            Instr::SelectAndApply { rec, feature, args } => {
                format!("{rec}.{feature}/{}", args.len())
            }
            Instr::Apply { callee, args } => format!("apply {callee}/{}", args.len()),
            Instr::Seq(items) => format!("seq/{}", items.len()),
            Instr::Local { idents, .. } => format!("local/{}", idents.len()),
            Instr::Try { .. } => "try".to_string(),
            Instr::Throw(arg) => format!("throw {arg}"),
            Instr::JumpCatch { id, .. } => format!("jump-catch {id}"),
            Instr::JumpThrow(id) => format!("jump {id}"),
            Instr::Act(def) => format!("act {}", def.target()),
            Instr::Skip => "skip".to_string(),
        }
    }
}
