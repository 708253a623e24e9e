//! Environments mapping identifiers to variable cells.
//!
//! An environment is a chain of immutable frames. Entering a scope (applying
//! a closure, `local`, a `case` arm, a `catch`) creates a child frame that
//! points at its parent; nothing is ever written into an existing frame.
//! Frames are `Arc`-shared, so saving an environment on the continuation
//! stack or in a closure is a pointer copy.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::errors::KernelError;
use crate::ident::Ident;
use crate::value::Var;

struct Frame {
    bindings: SmallVec<[(Ident, Var); 4]>,
    parent: Env,
}

/// An immutable chained environment. `Env::default()` is empty.
#[derive(Clone, Default)]
pub struct Env(Option<Arc<Frame>>);

impl Env {
    pub fn empty() -> Self {
        Env(None)
    }

    /// A child environment with `bindings` in a new innermost frame.
    ///
    /// Later entries shadow earlier ones within the frame.
    #[must_use]
    pub fn extend(&self, bindings: impl IntoIterator<Item = (Ident, Var)>) -> Env {
        let bindings: SmallVec<[(Ident, Var); 4]> = bindings.into_iter().collect();
        if bindings.is_empty() {
            return self.clone();
        }
        Env(Some(Arc::new(Frame {
            bindings,
            parent: self.clone(),
        })))
    }

    /// Look up `ident`, innermost frame first.
    pub fn lookup(&self, ident: &Ident) -> Option<&Var> {
        let mut current = self;
        while let Some(frame) = &current.0 {
            if let Some((_, var)) = frame.bindings.iter().rev().find(|(name, _)| name == ident) {
                return Some(var);
            }
            current = &frame.parent;
        }
        None
    }

    /// Like [`Env::lookup`], failing with `IdentNotFound`.
    pub fn get(&self, ident: &Ident) -> Result<&Var, KernelError> {
        self.lookup(ident)
            .ok_or_else(|| KernelError::IdentNotFound(ident.clone()))
    }

    /// A fresh single-frame environment holding only `idents`.
    ///
    /// Used when a closure is created: it keeps the cells of its free
    /// identifiers and nothing else.
    pub fn capture(&self, idents: &[Ident]) -> Result<Env, KernelError> {
        let bindings = idents
            .iter()
            .map(|ident| Ok((ident.clone(), self.get(ident)?.clone())))
            .collect::<Result<SmallVec<[(Ident, Var); 4]>, KernelError>>()?;
        Ok(Env::empty().extend(bindings))
    }

    /// Every binding, innermost frame first. Shadowed bindings are included.
    pub fn bindings(&self) -> impl Iterator<Item = (&Ident, &Var)> {
        let mut frames = Vec::new();
        let mut current = self;
        while let Some(frame) = &current.0 {
            frames.push(frame);
            current = &frame.parent;
        }
        frames
            .into_iter()
            .flat_map(|frame| frame.bindings.iter().map(|(ident, var)| (ident, var)))
    }

    /// Number of frames in the chain.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(frame) = &current.0 {
            depth += 1;
            current = &frame.parent;
        }
        depth
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.bindings()).finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
