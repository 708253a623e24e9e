//! Execution of single instructions.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::env::Env;
use crate::errors::{KernelError, NativeFault, Signal};
use crate::ident::Ident;
use crate::instr::{Instr, Operand};
use crate::value::{bind, unify, ActorCfg, Closure, Completable, Feature, Rec, Selectable, Value, Var};

use super::cont::Entry;
use super::operators::{evaluate_binary, evaluate_negate, evaluate_not};
use super::pattern::match_pattern;
use super::{Ambient, Machine, NativeCtx};

/// An operand's value. Bound identifiers are read through; unbound ones
/// stay cells.
fn operand_value(operand: &Operand, env: &Env) -> Result<Value, Signal> {
    match operand {
        Operand::Ident(ident) => Ok(Value::from_var(env.get(ident)?)),
        Operand::Value(value) => Ok(value.clone()),
    }
}

/// An operand's value, suspending if it is an unbound cell.
fn resolved_operand(operand: &Operand, env: &Env) -> Result<Value, Signal> {
    operand_value(operand, env)?.resolved()
}

/// An operand as a cell, for binding into a new scope.
fn operand_var(operand: &Operand, env: &Env) -> Result<Var, Signal> {
    match operand {
        Operand::Ident(ident) => Ok(env.get(ident)?.clone()),
        Operand::Value(value) => Ok(Var::bound(value.clone())),
    }
}

fn bind_target(target: &Ident, env: &Env, value: &Value) -> Result<(), Signal> {
    bind(env.get(target)?, value)?;
    Ok(())
}

fn feature_operand(operand: &Operand, env: &Env) -> Result<Feature, Signal> {
    let value = resolved_operand(operand, env)?;
    Feature::from_value(&value).ok_or_else(|| KernelError::InvalidFeature(value.to_string()).into())
}

fn label_operand(label: Option<&Operand>, env: &Env) -> Result<Option<Value>, Signal> {
    label.map(|label| operand_value(label, env)).transpose()
}

fn condition(cond: &Operand, env: &Env) -> Result<bool, Signal> {
    match resolved_operand(cond, env)? {
        Value::Bool(b) => Ok(b),
        other => Err(KernelError::NotBoolean(other.to_string()).into()),
    }
}

impl Machine {
    fn push_entry(&mut self, instr: &Arc<Instr>, env: Env) {
        self.stack.push(Entry::Instr {
            instr: Arc::clone(instr),
            env,
        });
    }

    pub(super) fn execute(
        &mut self,
        instr: &Instr,
        env: &Env,
        ambient: &mut dyn Ambient,
    ) -> Result<(), Signal> {
        match instr {
            Instr::BindCompleteToComplete { left, right } => Ok(unify(left, right)?),
            Instr::BindCompleteToIdent { value, ident } => bind_target(ident, env, value),
            Instr::BindIdentToIdent { left, right } => {
                let left = env.get(left)?.clone();
                let right = env.get(right)?.clone();
                Ok(unify(&Value::Var(left), &Value::Var(right))?)
            }
            Instr::Binary {
                op,
                left,
                right,
                target,
            } => {
                let left = resolved_operand(left, env)?;
                let right = resolved_operand(right, env)?;
                let result = evaluate_binary(*op, &left, &right)?;
                bind_target(target, env, &result)
            }
            Instr::Negate { arg, target } => {
                let result = evaluate_negate(&resolved_operand(arg, env)?)?;
                bind_target(target, env, &result)
            }
            Instr::Not { arg, target } => {
                let result = evaluate_not(&resolved_operand(arg, env)?)?;
                bind_target(target, env, &result)
            }
            Instr::CreateRec {
                label,
                fields,
                target,
            } => {
                let label = label_operand(label.as_ref(), env)?;
                let fields = fields
                    .iter()
                    .map(|(feature, value)| {
                        Ok((feature_operand(feature, env)?, operand_value(value, env)?))
                    })
                    .collect::<Result<Vec<_>, Signal>>()?;
                let rec = Rec::new(label, fields)?;
                bind_target(target, env, &Value::Rec(rec))
            }
            Instr::CreateTuple {
                label,
                values,
                target,
            } => {
                let label = label_operand(label.as_ref(), env)?;
                let values = values
                    .iter()
                    .map(|value| operand_value(value, env))
                    .collect::<Result<Vec<_>, Signal>>()?;
                bind_target(target, env, &Value::Rec(Rec::tuple(label, values)))
            }
            Instr::CreateProc { def, target } => {
                let closure = Closure::new(Arc::clone(def), env.capture(def.free())?);
                bind_target(target, env, &Value::Closure(closure))
            }
            Instr::CreateActorCfgtr { def, target } => {
                let closure = Closure::new(Arc::clone(def), env.capture(def.free())?);
                bind_target(target, env, &Value::ActorCfgtr(closure))
            }
            Instr::If { cond, then } => {
                if condition(cond, env)? {
                    self.push_entry(then, env.clone());
                }
                Ok(())
            }
            Instr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                let branch = if condition(cond, env)? { then } else { otherwise };
                self.push_entry(branch, env.clone());
                Ok(())
            }
            Instr::Case {
                arg,
                pat,
                body,
                otherwise,
            } => {
                let value = operand_value(arg, env)?;
                match match_pattern(pat, &value, env)? {
                    Some(bindings) => self.push_entry(body, env.extend(bindings)),
                    None => {
                        if let Some(otherwise) = otherwise {
                            self.push_entry(otherwise, env.clone());
                        }
                    }
                }
                Ok(())
            }
            Instr::Select {
                rec,
                feature,
                target,
            } => {
                let feature = feature_operand(feature, env)?;
                let value = operand_value(rec, env)?.select(&feature)?;
                bind_target(target, env, &value)
            }
            Instr::SelectAndApply { rec, feature, args } => {
                let callee = operand_value(rec, env)?.select(feature)?;
                self.apply(&callee, args, env, ambient)
            }
            Instr::Apply { callee, args } => {
                let callee = operand_value(callee, env)?;
                self.apply(&callee, args, env, ambient)
            }
            Instr::Seq(items) => {
                for item in items.iter().rev() {
                    self.push_entry(item, env.clone());
                }
                Ok(())
            }
            Instr::Local { idents, body } => {
                let env = env.extend(idents.iter().map(|ident| (ident.clone(), Var::new())));
                self.push_entry(body, env);
                Ok(())
            }
            Instr::Try {
                body,
                catch_arg,
                catch_body,
            } => {
                self.stack.push(Entry::Catch {
                    arg: catch_arg.clone(),
                    body: Arc::clone(catch_body),
                    env: env.clone(),
                });
                self.push_entry(body, env.clone());
                Ok(())
            }
            Instr::Throw(arg) => {
                let value = match arg {
                    Operand::Ident(ident) => env
                        .get(ident)?
                        .resolve()
                        .map_err(|_| KernelError::UnboundThrow(ident.clone()))?,
                    Operand::Value(value) => value.clone(),
                };
                Err(Signal::Throw(value))
            }
            Instr::JumpCatch { id, body } => {
                self.stack.push(Entry::JumpCatch(*id));
                self.push_entry(body, env.clone());
                Ok(())
            }
            Instr::JumpThrow(id) => Err(Signal::Jump(*id)),
            Instr::Act(def) => ambient.act(def, env),
            Instr::Skip => Ok(()),
        }
    }

    fn apply(
        &mut self,
        callee: &Value,
        args: &[Operand],
        env: &Env,
        ambient: &mut dyn Ambient,
    ) -> Result<(), Signal> {
        match callee.resolved()? {
            Value::Closure(closure) => {
                let def = closure.def();
                if def.params().len() != args.len() {
                    return Err(KernelError::WrongArgCount {
                        expected: def.params().len(),
                        found: args.len(),
                    }
                    .into());
                }
                let bindings = def
                    .params()
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| Ok((param.clone(), operand_var(arg, env)?)))
                    .collect::<Result<Vec<_>, Signal>>()?;
                self.push_entry(def.body(), closure.env().extend(bindings));
                Ok(())
            }
            Value::Proc(native) => {
                let values = args
                    .iter()
                    .map(|arg| operand_value(arg, env))
                    .collect::<Result<Vec<_>, Signal>>()?;
                let mut ctx = NativeCtx::new(ambient, env);
                catch_unwind(AssertUnwindSafe(|| native.call(&values, &mut ctx)))
                    .unwrap_or_else(|payload| Err(NativeFault::from_panic(&*payload).into()))
            }
            Value::ActorCfgtr(cfgtr) => {
                // Constructor arguments plus the result target; the
                // handlers parameter is supplied at spawn.
                let expected = cfgtr.def().params().len();
                let Some((target, inputs)) = args.split_last().filter(|_| args.len() == expected)
                else {
                    return Err(KernelError::WrongArgCount {
                        expected,
                        found: args.len(),
                    }
                    .into());
                };
                let args = inputs
                    .iter()
                    .map(|arg| operand_value(arg, env)?.check_complete().map_err(Signal::Suspend))
                    .collect::<Result<Vec<_>, Signal>>()?;
                let cfg = ActorCfg {
                    cfgtr: cfgtr.clone(),
                    args,
                };
                bind(&operand_var(target, env)?, &Value::ActorCfg(Arc::new(cfg)))?;
                Ok(())
            }
            other => Err(KernelError::NotProcedure(other.to_string()).into()),
        }
    }
}

