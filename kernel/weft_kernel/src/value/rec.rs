//! Records and tuples.
//!
//! A record is a label plus fields kept sorted by [`Feature`] order, so
//! lookup is a binary search and two records with the same feature set line
//! up field by field. Tuples are records whose features are exactly the
//! integers `0..n`; they share the representation.

use std::sync::Arc;

use crate::errors::KernelError;

use super::{Feature, Value};

struct RecInner {
    label: Option<Value>,
    fields: Box<[(Feature, Value)]>,
}

/// An immutable record. Cloning shares the fields.
#[derive(Clone)]
pub struct Rec(Arc<RecInner>);

impl Rec {
    /// Build a record from fields in any order.
    ///
    /// Fails with `DuplicateFeature` if a feature appears twice.
    pub fn new(label: Option<Value>, mut fields: Vec<(Feature, Value)>) -> Result<Self, KernelError> {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = fields.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(KernelError::DuplicateFeature(pair[0].0.clone()));
        }
        Ok(Self::from_sorted(label, fields))
    }

    /// Build a tuple: features `0..values.len()`.
    pub fn tuple(label: Option<Value>, values: Vec<Value>) -> Self {
        let fields = values
            .into_iter()
            .zip(0_i64..)
            .map(|(value, index)| (Feature::Int(index), value))
            .collect();
        Self::from_sorted(label, fields)
    }

    /// Fields must already be sorted and unique.
    pub(crate) fn from_sorted(label: Option<Value>, fields: Vec<(Feature, Value)>) -> Self {
        debug_assert!(fields.windows(2).all(|pair| pair[0].0 < pair[1].0));
        Rec(Arc::new(RecInner {
            label,
            fields: fields.into_boxed_slice(),
        }))
    }

    #[inline]
    pub fn label(&self) -> Option<&Value> {
        self.0.label.as_ref()
    }

    /// The label when it is a bound string, the common case for tags.
    pub fn label_str(&self) -> Option<Arc<str>> {
        match self.0.label.as_ref()?.resolve() {
            Ok(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn fields(&self) -> &[(Feature, Value)] {
        &self.0.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.fields.is_empty()
    }

    pub fn get(&self, feature: &Feature) -> Option<&Value> {
        self.0
            .fields
            .binary_search_by(|(f, _)| f.cmp(feature))
            .ok()
            .map(|index| &self.0.fields[index].1)
    }

    /// Field lookup by string feature.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.get(&Feature::str(name))
    }

    /// Whether the features are exactly `0..len`.
    pub fn is_tuple(&self) -> bool {
        self.0
            .fields
            .iter()
            .zip(0_i64..)
            .all(|((feature, _), index)| *feature == Feature::Int(index))
    }

    /// Values in feature order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.fields.iter().map(|(_, value)| value)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Rec) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key for visited sets.
    #[inline]
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Whether no field or label is an unbound cell (one level deep).
    pub(crate) fn is_shallow_complete(&self) -> bool {
        let unbound = |value: &Value| matches!(value, Value::Var(var) if !var.is_bound());
        !self.label().is_some_and(unbound) && !self.values().any(unbound)
    }

    /// Unification priority: complete tuple, complete record, partial tuple,
    /// partial record. Higher drives the walk.
    pub(crate) fn priority(&self) -> u8 {
        match (self.is_tuple(), self.is_shallow_complete()) {
            (true, true) => 4,
            (false, true) => 3,
            (true, false) => 2,
            (false, false) => 1,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fields_sorted_by_feature_order() {
        let rec = Rec::new(
            None,
            vec![
                (Feature::Null, Value::Int(1)),
                (Feature::Bool(true), Value::Int(2)),
                (Feature::Int(3), Value::Int(3)),
                (Feature::str("b"), Value::Int(4)),
                (Feature::str("a"), Value::Int(5)),
                (Feature::Eof, Value::Int(6)),
            ],
        )
        .unwrap();
        let order: Vec<Feature> = rec.fields().iter().map(|(f, _)| f.clone()).collect();
        assert_eq!(
            order,
            vec![
                Feature::str("a"),
                Feature::str("b"),
                Feature::Int(3),
                Feature::Bool(true),
                Feature::Eof,
                Feature::Null,
            ]
        );
    }

    #[test]
    fn duplicate_feature_rejected() {
        let err = Rec::new(
            None,
            vec![(Feature::str("a"), Value::Int(1)), (Feature::str("a"), Value::Int(2))],
        );
        assert!(matches!(err, Err(KernelError::DuplicateFeature(Feature::Str(_)))));
    }

    #[test]
    fn tuple_detection() {
        let tuple = Rec::tuple(None, vec![Value::Int(1), Value::Int(2)]);
        assert!(tuple.is_tuple());
        assert_eq!(tuple.get(&Feature::Int(1)), Some(&Value::Int(2)));

        let gap = Rec::new(None, vec![(Feature::Int(1), Value::Null)]).unwrap();
        assert!(!gap.is_tuple());
    }

    #[test]
    fn priority_orders_complete_before_partial() {
        let complete_tuple = Rec::tuple(None, vec![Value::Int(1)]);
        let partial_tuple = Rec::tuple(None, vec![Value::Var(crate::Var::new())]);
        let complete_rec = Rec::new(None, vec![(Feature::str("a"), Value::Int(1))]).unwrap();
        let partial_rec =
            Rec::new(None, vec![(Feature::str("a"), Value::Var(crate::Var::new()))]).unwrap();
        assert!(complete_tuple.priority() > complete_rec.priority());
        assert!(complete_rec.priority() > partial_tuple.priority());
        assert!(partial_tuple.priority() > partial_rec.priority());
    }
}
