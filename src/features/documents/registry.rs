//! Committed documents of one conversation.
//!
//! The list lives in a single `watch` cell. Every mutation goes through
//! [`DocumentRegistry::apply`], which computes the next list from the value
//! held at the moment of the call, so concurrent writers never overwrite each
//! other with stale copies. The list itself is only ever replaced, never
//! edited in place.

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::features::documents::models::Document;

#[derive(Debug, Clone)]
pub struct DocumentRegistry {
    state: Arc<watch::Sender<Vec<Document>>>,
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Vec::new());
        Self {
            state: Arc::new(state),
        }
    }

    /// Replace the list with `f(current)`; `None` keeps the current list.
    ///
    /// `f` runs while the cell is locked, so it must not block.
    pub fn apply<F>(&self, f: F) -> bool
    where
        F: FnOnce(&[Document]) -> Option<Vec<Document>>,
    {
        self.state.send_if_modified(|current| match f(current) {
            Some(next) => {
                *current = next;
                true
            }
            None => false,
        })
    }

    /// Append a batch to whatever the registry holds now
    pub fn append(&self, batch: Vec<Document>) -> bool {
        if batch.is_empty() {
            return false;
        }

        self.apply(|current| {
            let mut next = Vec::with_capacity(current.len() + batch.len());
            next.extend_from_slice(current);
            next.extend(batch);
            Some(next)
        })
    }

    /// Replace the single document with `id` by `f(document)`.
    ///
    /// Every other entry is carried over untouched. Returns `false` when the
    /// document is gone or `f` declines the change.
    pub fn patch<F>(&self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&Document) -> Option<Document>,
    {
        self.apply(|current| {
            let index = current.iter().position(|doc| doc.id == id)?;
            let updated = f(&current[index])?;

            let mut next = current.to_vec();
            next[index] = updated;
            Some(next)
        })
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.apply(|current| {
            current.iter().any(|doc| doc.id == id).then(|| {
                current
                    .iter()
                    .filter(|doc| doc.id != id)
                    .cloned()
                    .collect()
            })
        })
    }

    pub fn get(&self, id: Uuid) -> Option<Document> {
        self.state.borrow().iter().find(|doc| doc.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Document> {
        self.state.borrow().clone()
    }

    /// Run `f` against the current list without cloning it
    pub fn with_current<R>(&self, f: impl FnOnce(&[Document]) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Observe every replacement of the list
    pub fn subscribe(&self) -> watch::Receiver<Vec<Document>> {
        self.state.subscribe()
    }
}
