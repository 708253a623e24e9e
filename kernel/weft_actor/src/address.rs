//! Actor addresses and request identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The name an actor is registered under.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Arc<str>);

impl Address {
    pub fn new(name: &str) -> Self {
        Address(Arc::from(name))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A derived address for something this actor creates.
    pub(crate) fn child(&self, kind: &str, n: u64) -> Address {
        Address::new(&format!("{}/{kind}-{n}", self.0))
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Address::new(name)
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Address(Arc::from(name))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Correlates a request with its responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// A process-unique identifier.
    pub fn fresh() -> Self {
        RequestId(NEXT_REQUEST.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
