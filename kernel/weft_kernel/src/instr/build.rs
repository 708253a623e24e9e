//! Shorthand constructors for instruction graphs.
//!
//! Front ends normally emit instructions directly; these helpers keep
//! hand-assembled programs (tests, host-defined handlers) readable.

use std::sync::Arc;

use crate::ident::Ident;
use crate::value::{Feature, Value};

use super::{ActDef, BinaryOp, Instr, Operand, Pat, ProcDef};

pub fn id(name: &str) -> Ident {
    Ident::new(name)
}

/// Operand referring to an identifier.
pub fn var(name: &str) -> Operand {
    Operand::Ident(id(name))
}

/// Literal operand.
pub fn lit(value: impl Into<Value>) -> Operand {
    Operand::Value(value.into())
}

pub fn seq(items: Vec<Instr>) -> Instr {
    Instr::Seq(items.into_iter().map(Arc::new).collect())
}

pub fn local(names: &[&str], body: Instr) -> Instr {
    Instr::Local {
        idents: names.iter().map(|name| id(name)).collect(),
        body: Arc::new(body),
    }
}

/// `name = value`
pub fn bind(name: &str, value: impl Into<Value>) -> Instr {
    Instr::BindCompleteToIdent {
        value: value.into(),
        ident: id(name),
    }
}

/// `left = right` for two identifiers.
pub fn bind_idents(left: &str, right: &str) -> Instr {
    Instr::BindIdentToIdent {
        left: id(left),
        right: id(right),
    }
}

pub fn binary(op: BinaryOp, left: Operand, right: Operand, target: &str) -> Instr {
    Instr::Binary {
        op,
        left,
        right,
        target: id(target),
    }
}

pub fn apply(callee: &str, args: Vec<Operand>) -> Instr {
    Instr::Apply {
        callee: var(callee),
        args,
    }
}

pub fn select_apply(rec: &str, feature: &str, args: Vec<Operand>) -> Instr {
    Instr::SelectAndApply {
        rec: var(rec),
        feature: Feature::str(feature),
        args,
    }
}

pub fn select(target: &str, rec: &str, feature: &str) -> Instr {
    Instr::Select {
        rec: var(rec),
        feature: lit(feature),
        target: id(target),
    }
}

pub fn proc_def(params: &[&str], body: Instr) -> Arc<ProcDef> {
    Arc::new(ProcDef::new(
        params.iter().map(|name| id(name)).collect(),
        Arc::new(body),
    ))
}

/// `target = proc (params) body`
pub fn create_proc(target: &str, params: &[&str], body: Instr) -> Instr {
    Instr::CreateProc {
        def: proc_def(params, body),
        target: id(target),
    }
}

/// `target = actor (params, handlers) body`. The last parameter receives
/// the handlers record.
pub fn create_actor(target: &str, params: &[&str], body: Instr) -> Instr {
    Instr::CreateActorCfgtr {
        def: proc_def(params, body),
        target: id(target),
    }
}

/// `target = label(field: value, ...)`
pub fn rec(target: &str, label: Option<&str>, fields: Vec<(&str, Operand)>) -> Instr {
    Instr::CreateRec {
        label: label.map(|l| lit(l)),
        fields: fields
            .into_iter()
            .map(|(feature, value)| (lit(feature), value))
            .collect(),
        target: id(target),
    }
}

/// `target = [values...]`
pub fn tuple(target: &str, values: Vec<Operand>) -> Instr {
    Instr::CreateTuple {
        label: None,
        values,
        target: id(target),
    }
}

pub fn if_else(cond: Operand, then: Instr, otherwise: Instr) -> Instr {
    Instr::IfElse {
        cond,
        then: Arc::new(then),
        otherwise: Arc::new(otherwise),
    }
}

pub fn case(arg: Operand, pat: Pat, body: Instr, otherwise: Option<Instr>) -> Instr {
    Instr::Case {
        arg,
        pat,
        body: Arc::new(body),
        otherwise: otherwise.map(Arc::new),
    }
}

/// Record pattern with string features.
pub fn rec_pat(label: Option<&str>, fields: Vec<(&str, Pat)>, open: bool) -> Pat {
    Pat::Rec {
        label: label.map(Value::str),
        fields: fields
            .into_iter()
            .map(|(feature, pat)| (Feature::str(feature), pat))
            .collect(),
        open,
    }
}

pub fn try_catch(body: Instr, catch_arg: &str, catch_body: Instr) -> Instr {
    Instr::Try {
        body: Arc::new(body),
        catch_arg: id(catch_arg),
        catch_body: Arc::new(catch_body),
    }
}

pub fn throw(arg: Operand) -> Instr {
    Instr::Throw(arg)
}

/// `target = act body end`
pub fn act(target: &str, body: Instr) -> Instr {
    Instr::Act(Arc::new(ActDef::new(Arc::new(body), id(target))))
}
