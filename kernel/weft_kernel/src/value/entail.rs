//! Structural equality over possibly partial values.

use rustc_hash::FxHashSet;

use crate::stack::ensure_sufficient_stack;

use super::{Value, Var};

/// `Ok(equal)` or the unbound root the answer depends on.
pub(super) fn entails(a: &Value, b: &Value) -> Result<bool, Var> {
    Entailer::default().entails(a, b)
}

#[derive(Default)]
struct Entailer {
    /// Record pairs under comparison; revisiting one assumes equality.
    assumed: FxHashSet<(usize, usize)>,
}

impl Entailer {
    fn entails(&mut self, a: &Value, b: &Value) -> Result<bool, Var> {
        ensure_sufficient_stack(|| self.entails_inner(a, b))
    }

    fn entails_inner(&mut self, a: &Value, b: &Value) -> Result<bool, Var> {
        let (a, b) = match (a.resolve(), b.resolve()) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(x), Err(y)) if x.ptr_eq(&y) => return Ok(true),
            (Err(var), _) | (_, Err(var)) => return Err(var),
        };
        let (Value::Rec(x), Value::Rec(y)) = (&a, &b) else {
            return Ok(a.scalar_eq(&b));
        };
        if x.ptr_eq(y) || !self.assumed.insert((x.identity(), y.identity())) {
            return Ok(true);
        }
        if x.len() != y.len()
            || x.fields().iter().zip(y.fields()).any(|((f1, _), (f2, _))| f1 != f2)
        {
            return Ok(false);
        }
        match (x.label(), y.label()) {
            (None, None) => {}
            (Some(l1), Some(l2)) => {
                if !self.entails(l1, l2)? {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }
        for ((_, v1), (_, v2)) in x.fields().iter().zip(y.fields()) {
            if !self.entails(v1, v2)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
