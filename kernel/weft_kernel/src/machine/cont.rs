//! The continuation stack.
//!
//! A persistent singly linked list: pushing allocates one node, popping
//! moves to the tail. Frames are immutable, so a snapshot of the stack is a
//! pointer copy.

use std::sync::Arc;

use crate::env::Env;
use crate::ident::Ident;
use crate::instr::Instr;

#[derive(Clone)]
pub(super) enum Entry {
    Instr { instr: Arc<Instr>, env: Env },
    /// Pushed by `try` beneath its body. Popped normally when the body
    /// completes; found by unwinding when something is thrown.
    Catch {
        arg: Ident,
        body: Arc<Instr>,
        env: Env,
    },
    /// Pushed by `jump-catch` beneath its body.
    JumpCatch(u32),
}

impl Entry {
    pub(super) fn summary(&self) -> String {
        match self {
            Entry::Instr { instr, .. } => instr.summary(),
            Entry::Catch { arg, .. } => format!("catch {arg}"),
            Entry::JumpCatch(id) => format!("jump-catch {id}"),
        }
    }
}

struct Node {
    entry: Entry,
    next: ContStack,
}

#[derive(Clone, Default)]
pub(super) struct ContStack(Option<Arc<Node>>);

impl ContStack {
    pub(super) fn push(&mut self, entry: Entry) {
        let next = std::mem::take(self);
        self.0 = Some(Arc::new(Node { entry, next }));
    }

    pub(super) fn pop(&mut self) -> Option<Entry> {
        let node = self.0.take()?;
        match Arc::try_unwrap(node) {
            Ok(node) => {
                *self = node.next;
                Some(node.entry)
            }
            Err(shared) => {
                *self = shared.next.clone();
                Some(shared.entry.clone())
            }
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &Entry> {
        let mut current = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.next.0.as_deref();
            Some(&node.entry)
        })
    }

    pub(super) fn len(&self) -> usize {
        self.iter().count()
    }
}

impl Drop for ContStack {
    /// Unlink iteratively; the default recursive drop overflows on deep
    /// stacks.
    fn drop(&mut self) {
        let mut next = self.0.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.0.take(),
                Err(_) => break,
            }
        }
    }
}
