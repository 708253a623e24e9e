//! Structured failure values.
//!
//! A `FailedValue` is how an actor-terminating error travels: as the
//! response to an in-flight request, as a thrown value after a native fault,
//! or wrapped inside a parent's failure when a child actor fails. It converts
//! to and from an ordinary labeled record so programs can match on it:
//!
//! ```text
//! FailedValue(
//!     address: 'counter',
//!     error: error(name: 'DivisionByZero', message: 'division by zero'),
//!     stack: ['apply div', 'seq/3'],
//!     cause: null | FailedValue(...),
//!     native_cause: null | native_cause(kind: 'panic', message: '...'),
//! )
//! ```

use std::fmt;

use crate::errors::{error_value, NativeFault};
use crate::value::{Feature, Rec, Value};

pub const FAILED_VALUE_LABEL: &str = "FailedValue";
const NATIVE_CAUSE_LABEL: &str = "native_cause";

/// The retained part of a fault raised outside the kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeCause {
    pub kind: String,
    pub message: String,
}

impl From<&NativeFault> for NativeCause {
    fn from(fault: &NativeFault) -> Self {
        NativeCause {
            kind: fault.kind.clone(),
            message: fault.message.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FailedValue {
    pub address: String,
    pub error: Value,
    pub stack: Vec<String>,
    pub cause: Option<Box<FailedValue>>,
    pub native_cause: Option<NativeCause>,
}

impl FailedValue {
    pub fn new(address: impl Into<String>, error: Value) -> Self {
        FailedValue {
            address: address.into(),
            error,
            stack: Vec::new(),
            cause: None,
            native_cause: None,
        }
    }

    /// A failure raised by a native fault.
    pub fn from_fault(address: impl Into<String>, fault: &NativeFault) -> Self {
        let mut failed = Self::new(address, error_value("NativeFault", &fault.to_string()));
        failed.native_cause = Some(NativeCause::from(fault));
        failed
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }

    /// Wrap a child's failure as the cause of this one.
    #[must_use]
    pub fn with_cause(mut self, cause: FailedValue) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The innermost failure in the cause chain.
    pub fn root_cause(&self) -> &FailedValue {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }

    /// The `message` field of an error record, or the error rendered.
    pub fn message(&self) -> String {
        match self.error.resolve() {
            Ok(Value::Rec(rec)) => match rec.field("message").map(Value::resolve) {
                Some(Ok(Value::Str(s))) => s.to_string(),
                _ => rec_display(&rec),
            },
            Ok(other) => other.to_string(),
            Err(var) => var.id().to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        let cause = self
            .cause
            .as_ref()
            .map_or(Value::Null, |cause| cause.to_value());
        let native_cause = self.native_cause.as_ref().map_or(Value::Null, |native| {
            Value::Rec(Rec::from_sorted(
                Some(Value::str(NATIVE_CAUSE_LABEL)),
                vec![
                    (Feature::str("kind"), Value::str(&native.kind)),
                    (Feature::str("message"), Value::str(&native.message)),
                ],
            ))
        });
        let stack = Value::tuple(self.stack.iter().map(|frame| Value::str(frame)).collect());
        Value::Rec(Rec::from_sorted(
            Some(Value::str(FAILED_VALUE_LABEL)),
            vec![
                (Feature::str("address"), Value::str(&self.address)),
                (Feature::str("cause"), cause),
                (Feature::str("error"), self.error.clone()),
                (Feature::str("native_cause"), native_cause),
                (Feature::str("stack"), stack),
            ],
        ))
    }

    /// Read a failed value back from its record form.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Ok(Value::Rec(rec)) = value.resolve() else {
            return None;
        };
        if rec.label_str().as_deref() != Some(FAILED_VALUE_LABEL) {
            return None;
        }
        let text = |name: &str| match rec.field(name)?.resolve() {
            Ok(Value::Str(s)) => Some(s.to_string()),
            _ => None,
        };
        let address = text("address")?;
        let error = rec.field("error")?.clone();
        let stack = match rec.field("stack")?.resolve() {
            Ok(Value::Rec(frames)) => frames
                .values()
                .filter_map(|frame| match frame.resolve() {
                    Ok(Value::Str(s)) => Some(s.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let cause = rec
            .field("cause")
            .and_then(FailedValue::from_value)
            .map(Box::new);
        let native_cause = match rec.field("native_cause").map(Value::resolve) {
            Some(Ok(Value::Rec(native))) => {
                let field = |name: &str| match native.field(name)?.resolve() {
                    Ok(Value::Str(s)) => Some(s.to_string()),
                    _ => None,
                };
                Some(NativeCause {
                    kind: field("kind")?,
                    message: field("message")?,
                })
            }
            _ => None,
        };
        Some(FailedValue {
            address,
            error,
            stack,
            cause,
            native_cause,
        })
    }

    pub fn is_failed_value(value: &Value) -> bool {
        matches!(value.resolve(), Ok(Value::Rec(rec)) if rec.label_str().as_deref() == Some(FAILED_VALUE_LABEL))
    }
}

fn rec_display(rec: &Rec) -> String {
    Value::Rec(rec.clone()).to_string()
}

impl fmt::Display for FailedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor `{}` failed: {}", self.address, self.message())?;
        if let Some(native) = &self.native_cause {
            write!(f, " (native {}: {})", native.kind, native.message)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n  caused by {cause}")?;
        }
        Ok(())
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
    fn record_form_round_trip() {
        let child = FailedValue::from_fault("child", &NativeFault::new("panic", "boom"))
            .with_stack(vec!["apply f".to_string()]);
        let parent = FailedValue::new("parent", Value::str("oops")).with_cause(child);

        let value = parent.to_value();
        assert!(FailedValue::is_failed_value(&value));
        let back = FailedValue::from_value(&value).unwrap();
        assert_eq!(back.address, "parent");
        assert_eq!(back.error, Value::str("oops"));
        let cause = back.cause.as_deref().unwrap();
        assert_eq!(cause.address, "child");
        assert_eq!(cause.stack, vec!["apply f".to_string()]);
        assert_eq!(
            cause.native_cause,
            Some(NativeCause {
                kind: "panic".to_string(),
                message: "boom".to_string()
            })
        );
        assert_eq!(back.root_cause().address, "child");
    }

    #[test]
    fn message_prefers_error_record_message() {
        let failed = FailedValue::new("a", error_value("DivisionByZero", "division by zero"));
        assert_eq!(failed.message(), "division by zero");
    }

    #[test]
    fn ordinary_records_are_not_failures() {
        let value = Value::labeled("error", vec![]).unwrap();
        assert!(FailedValue::from_value(&value).is_none());
    }
}
