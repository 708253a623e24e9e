//! Single-assignment variable cells.
//!
//! A cell is unbound, bound to a value, or an alias of another cell. Alias
//! chains form a union-find forest; [`Var::root`] follows a chain and
//! compresses it. Only roots carry state: an unbound root owns the callbacks
//! waiting for it, a bound root owns its value.
//!
//! # Locking
//!
//! Every cell has its own mutex. Code holds at most one cell lock at a time,
//! except [`Var::link`], which locks two roots in ascending id order.
//! Callbacks always run after the lock is released, so a callback may freely
//! read or bind other cells.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Value;

static NEXT_VAR: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a variable cell.
///
/// Ids increase monotonically in creation order, so a smaller id is always
/// the older cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// Callback run once, with the bound value, when a cell becomes bound.
pub type BindCallback = Box<dyn FnOnce(&Value) + Send>;

enum Slot {
    Unbound(Vec<BindCallback>),
    Bound(Value),
    Alias(Var),
}

struct VarCell {
    id: VarId,
    slot: Mutex<Slot>,
}

/// A shared handle to a variable cell.
#[derive(Clone)]
pub struct Var(Arc<VarCell>);

/// Result of [`Var::try_set`].
pub(crate) enum SetOutcome {
    Set,
    Existing(Value),
}

/// Result of [`Var::link`].
pub(crate) enum LinkOutcome {
    Linked,
    /// One of the roots changed state while locking; resolve again.
    Retry,
}

impl Var {
    /// Create a fresh unbound cell.
    pub fn new() -> Self {
        Self::with_slot(Slot::Unbound(Vec::new()))
    }

    /// Create a cell already bound to `value`.
    ///
    /// A `Value::Var` is returned as-is instead of being wrapped.
    pub fn bound(value: Value) -> Self {
        match value {
            Value::Var(var) => var,
            other => Self::with_slot(Slot::Bound(other)),
        }
    }

    fn with_slot(slot: Slot) -> Self {
        let id = VarId(NEXT_VAR.fetch_add(1, Ordering::Relaxed));
        Var(Arc::new(VarCell {
            id,
            slot: Mutex::new(slot),
        }))
    }

    #[inline]
    pub fn id(&self) -> VarId {
        self.0.id
    }

    /// Whether both handles point at the same cell (not the same class).
    #[inline]
    pub fn ptr_eq(&self, other: &Var) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether both cells belong to the same equivalence class.
    pub fn same_class(&self, other: &Var) -> bool {
        self.root().ptr_eq(&other.root())
    }

    /// The representative of this cell's equivalence class.
    pub fn root(&self) -> Var {
        let mut current = self.clone();
        let mut path: Vec<Var> = Vec::new();
        loop {
            let next = match &*current.0.slot.lock() {
                Slot::Alias(next) => next.clone(),
                _ => break,
            };
            path.push(current);
            current = next;
        }
        // The last entry already points at the root.
        if path.len() > 1 {
            for var in &path[..path.len() - 1] {
                let mut slot = var.0.slot.lock();
                if matches!(&*slot, Slot::Alias(_)) {
                    *slot = Slot::Alias(current.clone());
                }
            }
        }
        current
    }

    /// The bound value, or the unbound root cell to wait on.
    pub fn resolve(&self) -> Result<Value, Var> {
        loop {
            let root = self.root();
            let state = match &*root.0.slot.lock() {
                Slot::Bound(value) => Some(Some(value.clone())),
                Slot::Unbound(_) => Some(None),
                Slot::Alias(_) => None,
            };
            match state {
                Some(Some(value)) => return Ok(value),
                Some(None) => return Err(root),
                // Linked to another class after `root()` returned.
                None => continue,
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Run `callback` once this cell is bound.
    ///
    /// Runs immediately, on the calling thread, when the cell is already
    /// bound. Callbacks survive linking: they move to the surviving root.
    pub fn on_bind(&self, callback: BindCallback) {
        let mut pending = Some(callback);
        loop {
            let root = self.root();
            let ready = {
                let mut slot = root.0.slot.lock();
                match &mut *slot {
                    Slot::Unbound(callbacks) => {
                        if let Some(callback) = pending.take() {
                            callbacks.push(callback);
                        }
                        return;
                    }
                    Slot::Bound(value) => Some(value.clone()),
                    Slot::Alias(_) => None,
                }
            };
            if let Some(value) = ready {
                if let Some(callback) = pending.take() {
                    callback(&value);
                }
                return;
            }
        }
    }

    /// Bind this cell's root to `value` if it is unbound.
    ///
    /// When the root is already bound its value is returned so the caller can
    /// unify it with `value`. `value` must not itself be a `Value::Var`.
    pub(crate) fn try_set(&self, value: &Value) -> SetOutcome {
        loop {
            let root = self.root();
            let outcome = {
                let mut slot = root.0.slot.lock();
                match &mut *slot {
                    Slot::Unbound(callbacks) => {
                        let callbacks = std::mem::take(callbacks);
                        *slot = Slot::Bound(value.clone());
                        Ok(callbacks)
                    }
                    Slot::Bound(existing) => Err(Some(existing.clone())),
                    Slot::Alias(_) => Err(None),
                }
            };
            match outcome {
                Ok(callbacks) => {
                    tracing::trace!(var = %root.id(), callbacks = callbacks.len(), "bound");
                    for callback in callbacks {
                        callback(value);
                    }
                    return SetOutcome::Set;
                }
                Err(Some(existing)) => return SetOutcome::Existing(existing),
                Err(None) => continue,
            }
        }
    }

    /// Merge two unbound classes. The younger root becomes an alias of the
    /// older one and hands over its callbacks.
    pub(crate) fn link(&self, other: &Var) -> LinkOutcome {
        let a = self.root();
        let b = other.root();
        if a.ptr_eq(&b) {
            return LinkOutcome::Linked;
        }
        let (older, younger) = if a.id() < b.id() { (a, b) } else { (b, a) };
        let mut older_slot = older.0.slot.lock();
        let mut younger_slot = younger.0.slot.lock();
        match (&mut *older_slot, &mut *younger_slot) {
            (Slot::Unbound(kept), Slot::Unbound(moved)) => kept.append(moved),
            _ => return LinkOutcome::Retry,
        }
        *younger_slot = Slot::Alias(older.clone());
        LinkOutcome::Linked
    }
}

impl Default for Var {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.id)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Ok(value) => write!(f, "{value}"),
            Err(root) => write!(f, "{}", root.id()),
        }
    }
}
