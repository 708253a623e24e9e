//! Free identifier analysis.

use rustc_hash::FxHashSet;

use crate::ident::Ident;
use crate::stack::ensure_sufficient_stack;

use super::{Instr, Operand, Pat};

/// Identifiers used in `body` that are not in `params` and not declared
/// within `body`, in order of first use.
pub(super) fn free_idents(params: &[Ident], body: &Instr) -> Vec<Ident> {
    let mut walker = FreeWalker {
        scope: params.to_vec(),
        seen: FxHashSet::default(),
        out: Vec::new(),
    };
    walker.instr(body);
    walker.out
}

struct FreeWalker {
    /// Identifiers declared on the current path, innermost last.
    scope: Vec<Ident>,
    seen: FxHashSet<Ident>,
    out: Vec<Ident>,
}

impl FreeWalker {
    fn use_ident(&mut self, ident: &Ident) {
        if !self.scope.contains(ident) && self.seen.insert(ident.clone()) {
            self.out.push(ident.clone());
        }
    }

    fn operand(&mut self, operand: &Operand) {
        if let Operand::Ident(ident) = operand {
            self.use_ident(ident);
        }
    }

    fn scoped(&mut self, declared: impl IntoIterator<Item = Ident>, body: &Instr) {
        let mark = self.scope.len();
        self.scope.extend(declared);
        self.instr(body);
        self.scope.truncate(mark);
    }

    fn pat(&mut self, pat: &Pat) {
        match pat {
            Pat::Escaped(ident) => self.use_ident(ident),
            Pat::Rec { fields, .. } => {
                for (_, field) in fields {
                    self.pat(field);
                }
            }
            Pat::Skip | Pat::Ident(_) | Pat::Literal(_) => {}
        }
    }

    fn instr(&mut self, instr: &Instr) {
        ensure_sufficient_stack(|| self.instr_inner(instr));
    }

    fn instr_inner(&mut self, instr: &Instr) {
        match instr {
            Instr::BindCompleteToComplete { .. } | Instr::JumpThrow(_) | Instr::Skip => {}
            Instr::BindCompleteToIdent { ident, .. } => self.use_ident(ident),
            Instr::BindIdentToIdent { left, right } => {
                self.use_ident(left);
                self.use_ident(right);
            }
            Instr::Binary {
                left,
                right,
                target,
                ..
            } => {
                self.operand(left);
                self.operand(right);
                self.use_ident(target);
            }
            Instr::Negate { arg, target } | Instr::Not { arg, target } => {
                self.operand(arg);
                self.use_ident(target);
            }
            Instr::CreateRec {
                label,
                fields,
                target,
            } => {
                if let Some(label) = label {
                    self.operand(label);
                }
                for (feature, value) in fields {
                    self.operand(feature);
                    self.operand(value);
                }
                self.use_ident(target);
            }
            Instr::CreateTuple {
                label,
                values,
                target,
            } => {
                if let Some(label) = label {
                    self.operand(label);
                }
                for value in values {
                    self.operand(value);
                }
                self.use_ident(target);
            }
            Instr::CreateProc { def, target } | Instr::CreateActorCfgtr { def, target } => {
                for ident in def.free() {
                    self.use_ident(ident);
                }
                self.use_ident(target);
            }
            Instr::If { cond, then } => {
                self.operand(cond);
                self.instr(then);
            }
            Instr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                self.operand(cond);
                self.instr(then);
                self.instr(otherwise);
            }
            Instr::Case {
                arg,
                pat,
                body,
                otherwise,
            } => {
                self.operand(arg);
                self.pat(pat);
                self.scoped(pat.bound_idents(), body);
                if let Some(otherwise) = otherwise {
                    self.instr(otherwise);
                }
            }
            Instr::Select {
                rec,
                feature,
                target,
            } => {
                self.operand(rec);
                self.operand(feature);
                self.use_ident(target);
            }
            Instr::SelectAndApply { rec, args, .. } => {
                self.operand(rec);
                for arg in args {
                    self.operand(arg);
                }
            }
            Instr::Apply { callee, args } => {
                self.operand(callee);
                for arg in args {
                    self.operand(arg);
                }
            }
            Instr::Seq(items) => {
                for item in items {
                    self.instr(item);
                }
            }
            Instr::Local { idents, body } => self.scoped(idents.iter().cloned(), body),
            Instr::Try {
                body,
                catch_arg,
                catch_body,
            } => {
                self.instr(body);
                self.scoped([catch_arg.clone()], catch_body);
            }
            Instr::Throw(arg) => self.operand(arg),
            Instr::JumpCatch { body, .. } => self.instr(body),
            Instr::Act(def) => {
                for ident in def.free() {
                    self.use_ident(ident);
                }
                self.use_ident(def.target());
            }
        }
    }
}
