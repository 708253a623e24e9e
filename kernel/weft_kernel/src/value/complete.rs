//! Completion checks.
//!
//! A value is complete when every cell reachable from it is bound. The
//! check returns a copy in which bound cells are replaced by their values.
//!
//! Composites are memoized by identity: a record reached twice maps to one
//! output, and a record with nothing to replace is returned as-is. A cell
//! that leads back into a record still being walked is kept as the bound
//! cell, which is what lets self-referential values complete.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::stack::ensure_sufficient_stack;

use super::{Closure, Rec, Value, Var};

pub(super) fn check_complete(value: &Value) -> Result<Value, Var> {
    Completer::default().complete(value)
}

#[derive(Default)]
struct Completer {
    done: FxHashMap<usize, Value>,
    in_progress: FxHashSet<usize>,
}

/// Whether `complete` handed back the very node it was given.
fn same_node(before: &Value, after: &Value) -> bool {
    match (before, after) {
        (Value::Rec(a), Value::Rec(b)) => a.ptr_eq(b),
        (Value::Var(a), Value::Var(b)) => a.ptr_eq(b),
        (Value::Var(_), _) | (_, Value::Var(_)) => false,
        _ => true,
    }
}

impl Completer {
    fn complete(&mut self, value: &Value) -> Result<Value, Var> {
        ensure_sufficient_stack(|| match value {
            Value::Var(var) => {
                let bound = var.resolve()?;
                if self.is_back_edge(&bound) {
                    return Ok(value.clone());
                }
                self.complete(&bound)
            }
            Value::Rec(rec) => self.complete_rec(rec),
            Value::Closure(closure) | Value::ActorCfgtr(closure) => {
                self.complete_closure(closure)?;
                Ok(value.clone())
            }
            _ => Ok(value.clone()),
        })
    }

    fn is_back_edge(&self, value: &Value) -> bool {
        match value {
            Value::Rec(rec) => self.in_progress.contains(&rec.identity()),
            Value::Closure(closure) | Value::ActorCfgtr(closure) => {
                self.in_progress.contains(&closure.identity())
            }
            _ => false,
        }
    }

    fn complete_rec(&mut self, rec: &Rec) -> Result<Value, Var> {
        let id = rec.identity();
        if let Some(done) = self.done.get(&id) {
            return Ok(done.clone());
        }
        if !self.in_progress.insert(id) {
            return Ok(Value::Rec(rec.clone()));
        }

        let mut changed = false;
        let label = match rec.label() {
            Some(label) => {
                let completed = self.complete(label)?;
                changed |= !same_node(label, &completed);
                Some(completed)
            }
            None => None,
        };
        let mut fields = Vec::with_capacity(rec.len());
        for (feature, field) in rec.fields() {
            let completed = self.complete(field)?;
            changed |= !same_node(field, &completed);
            fields.push((feature.clone(), completed));
        }

        self.in_progress.remove(&id);
        let result = if changed {
            Value::Rec(Rec::from_sorted(label, fields))
        } else {
            Value::Rec(rec.clone())
        };
        self.done.insert(id, result.clone());
        Ok(result)
    }

    /// A closure is complete when every captured cell is.
    fn complete_closure(&mut self, closure: &Closure) -> Result<(), Var> {
        let id = closure.identity();
        if self.done.contains_key(&id) || !self.in_progress.insert(id) {
            return Ok(());
        }
        for (_, var) in closure.env().bindings() {
            self.complete(&Value::Var(var.clone()))?;
        }
        self.in_progress.remove(&id);
        self.done.insert(id, Value::Closure(closure.clone()));
        Ok(())
    }
}
