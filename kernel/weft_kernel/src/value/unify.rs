//! Unification of values and variable cells.
//!
//! Unification binds unbound cells so that both sides become equal, or
//! reports why they cannot be. It never suspends: an unbound cell is simply
//! bound. Bindings made before a conflict is found are kept, since cells
//! are single-assignment.

use rustc_hash::FxHashSet;

use crate::stack::ensure_sufficient_stack;

use super::{Feature, LinkOutcome, Rec, SetOutcome, Value, Var};

/// Error during unification.
#[derive(Clone, Debug, thiserror::Error)]
pub enum UnifyError {
    /// Values are incompatible.
    #[error("cannot unify {left} with {right}")]
    Mismatch { left: Value, right: Value },
    /// Records have different numbers of fields.
    #[error("arity mismatch: {left} fields against {right}")]
    ArityMismatch { left: usize, right: usize },
    /// A feature present on one record is missing from the other.
    #[error("feature `{0}` is not present on both records")]
    FeatureMismatch(Feature),
}

/// Bind `var` to `value`.
///
/// Binding an unbound cell fires its callbacks. Binding an already bound
/// cell unifies the two values: equal values are a no-op, unequal values
/// fail and leave the cell unchanged.
pub fn bind(var: &Var, value: &Value) -> Result<(), UnifyError> {
    Unifier::default().unify_var_value(var, value)
}

/// Unify two values.
pub fn unify(left: &Value, right: &Value) -> Result<(), UnifyError> {
    Unifier::default().unify(left, right)
}

#[derive(Default)]
struct Unifier {
    /// Record pairs already being unified; reaching one again succeeds,
    /// which makes unification of cyclic structures terminate.
    in_progress: FxHashSet<(usize, usize)>,
}

impl Unifier {
    fn unify(&mut self, left: &Value, right: &Value) -> Result<(), UnifyError> {
        ensure_sufficient_stack(|| match (left, right) {
            (Value::Var(x), Value::Var(y)) => self.unify_vars(x, y),
            (Value::Var(var), value) | (value, Value::Var(var)) => {
                self.unify_var_value(var, value)
            }
            _ => self.unify_values(left, right),
        })
    }

    fn unify_vars(&mut self, x: &Var, y: &Var) -> Result<(), UnifyError> {
        loop {
            match (x.resolve(), y.resolve()) {
                (Err(a), Err(b)) => match a.link(&b) {
                    LinkOutcome::Linked => return Ok(()),
                    LinkOutcome::Retry => continue,
                },
                (Ok(value), Err(unbound)) | (Err(unbound), Ok(value)) => {
                    return self.unify_var_value(&unbound, &value)
                }
                (Ok(a), Ok(b)) => return self.unify_values(&a, &b),
            }
        }
    }

    fn unify_var_value(&mut self, var: &Var, value: &Value) -> Result<(), UnifyError> {
        if let Value::Var(other) = value {
            return self.unify_vars(var, other);
        }
        match var.try_set(value) {
            SetOutcome::Set => Ok(()),
            SetOutcome::Existing(existing) => self.unify(&existing, value),
        }
    }

    /// Neither side is a cell.
    fn unify_values(&mut self, left: &Value, right: &Value) -> Result<(), UnifyError> {
        match (left, right) {
            (Value::Rec(a), Value::Rec(b)) => self.unify_recs(a, b),
            _ if left.scalar_eq(right) => Ok(()),
            _ => Err(UnifyError::Mismatch {
                left: left.clone(),
                right: right.clone(),
            }),
        }
    }

    fn unify_recs(&mut self, a: &Rec, b: &Rec) -> Result<(), UnifyError> {
        if a.ptr_eq(b) {
            return Ok(());
        }
        let key = if a.identity() <= b.identity() {
            (a.identity(), b.identity())
        } else {
            (b.identity(), a.identity())
        };
        if !self.in_progress.insert(key) {
            return Ok(());
        }
        let (lead, other) = if b.priority() > a.priority() { (b, a) } else { (a, b) };
        if lead.len() != other.len() {
            return Err(UnifyError::ArityMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        match (lead.label(), other.label()) {
            (None, None) => {}
            (Some(l1), Some(l2)) => self.unify(l1, l2)?,
            _ => {
                return Err(UnifyError::Mismatch {
                    left: Value::Rec(a.clone()),
                    right: Value::Rec(b.clone()),
                })
            }
        }
        for (feature, value) in lead.fields() {
            let Some(counterpart) = other.get(feature) else {
                return Err(UnifyError::FeatureMismatch(feature.clone()));
            };
            self.unify(value, counterpart)?;
        }
        Ok(())
    }
}
