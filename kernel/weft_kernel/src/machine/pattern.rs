//! `case` pattern matching.

use crate::env::Env;
use crate::errors::Signal;
use crate::ident::Ident;
use crate::instr::Pat;
use crate::stack::ensure_sufficient_stack;
use crate::value::{Entailable, Value, Var};

/// Bindings produced by a successful match.
pub(super) type Bindings = Vec<(Ident, Var)>;

/// Match `value` against `pat`.
///
/// `Ok(None)` is a definite mismatch. Matching suspends only when the part
/// of the value the pattern inspects is an unbound cell; shape checks that
/// can fail without it are done first.
pub(super) fn match_pattern(pat: &Pat, value: &Value, env: &Env) -> Result<Option<Bindings>, Signal> {
    let mut bindings = Vec::new();
    if match_into(pat, value, env, &mut bindings)? {
        Ok(Some(bindings))
    } else {
        Ok(None)
    }
}

fn match_into(pat: &Pat, value: &Value, env: &Env, out: &mut Bindings) -> Result<bool, Signal> {
    ensure_sufficient_stack(|| match pat {
        Pat::Skip => Ok(true),
        Pat::Ident(ident) => {
            let var = match value {
                Value::Var(var) => var.clone(),
                other => Var::bound(other.clone()),
            };
            out.push((ident.clone(), var));
            Ok(true)
        }
        Pat::Escaped(ident) => {
            let var = env.get(ident)?;
            value.entails(&Value::Var(var.clone()))
        }
        Pat::Literal(literal) => value.entails(literal),
        Pat::Rec {
            label,
            fields,
            open,
        } => {
            let Value::Rec(rec) = value.resolved()? else {
                return Ok(false);
            };
            let arity_ok = if *open {
                rec.len() >= fields.len()
            } else {
                rec.len() == fields.len()
            };
            if !arity_ok || fields.iter().any(|(feature, _)| rec.get(feature).is_none()) {
                return Ok(false);
            }
            match (label, rec.label()) {
                (None, None) => {}
                (Some(expected), Some(actual)) => {
                    if !actual.entails(expected)? {
                        return Ok(false);
                    }
                }
                _ => return Ok(false),
            }
            for (feature, field_pat) in fields {
                let Some(field) = rec.get(feature) else {
                    return Ok(false);
                };
                if !match_into(field_pat, field, env, out)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    })
}
