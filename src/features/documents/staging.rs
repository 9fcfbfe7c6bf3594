//! Staging buffer for files picked but not yet committed.
//!
//! Adding is idempotent: a file whose signature is already staged, already
//! committed, or seen earlier in the same call is dropped without error.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::features::documents::models::{Document, SelectedFile};

#[derive(Debug, Default)]
pub struct StagingBuffer {
    documents: Vec<Document>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `files` as pending documents, skipping duplicates.
    ///
    /// `committed` is the registry content at the time of the call. Survivors
    /// keep their input order. Returns the documents that were staged.
    pub fn add(&mut self, files: Vec<SelectedFile>, committed: &[Document]) -> Vec<Document> {
        let mut seen: HashSet<_> = self
            .documents
            .iter()
            .chain(committed)
            .map(Document::signature)
            .collect();

        let mut added = Vec::new();

        for file in files {
            if !seen.insert(file.signature()) {
                debug!("Skipping duplicate selection: {}", file.name);
                continue;
            }

            let document = Document::pending(file);
            added.push(document.clone());
            self.documents.push(document);
        }

        added
    }

    /// Drop a staged document; unknown ids are ignored
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.documents.len();
        self.documents.retain(|doc| doc.id != id);
        before != self.documents.len()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn list(&self) -> &[Document] {
        &self.documents
    }

    /// Move every staged document out, leaving the buffer empty
    pub fn take(&mut self) -> Vec<Document> {
        std::mem::take(&mut self.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::documents::models::DocumentStatus;
    use bytes::Bytes;

    fn file(name: &str, size: usize, last_modified: i64) -> SelectedFile {
        SelectedFile::new(
            name,
            "application/pdf",
            last_modified,
            Bytes::from(vec![0u8; size]),
        )
    }

    #[test]
    fn test_add_preserves_input_order() {
        let mut buffer = StagingBuffer::new();

        let added = buffer.add(
            vec![file("a.pdf", 1, 1), file("b.pdf", 2, 2), file("c.pdf", 3, 3)],
            &[],
        );

        assert_eq!(added.len(), 3);
        let names: Vec<_> = buffer.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert!(buffer
            .list()
            .iter()
            .all(|d| d.status == DocumentStatus::Pending));
    }

    #[test]
    fn test_add_same_file_across_calls() {
        let mut buffer = StagingBuffer::new();

        buffer.add(vec![file("report.pdf", 1024, 100)], &[]);
        let second = buffer.add(vec![file("report.pdf", 1024, 100)], &[]);

        assert!(second.is_empty());
        assert_eq!(buffer.list().len(), 1);
    }

    #[test]
    fn test_add_same_file_within_one_call() {
        let mut buffer = StagingBuffer::new();
        let same = file("report.pdf", 1024, 100);

        let added = buffer.add(vec![same.clone(), same], &[]);

        assert_eq!(added.len(), 1);
        assert_eq!(buffer.list().len(), 1);
    }

    #[test]
    fn test_add_skips_committed_files() {
        let mut buffer = StagingBuffer::new();
        let committed = vec![Document::pending(file("report.pdf", 1024, 100))
            .into_uploading()
            .unwrap()];

        let added = buffer.add(
            vec![file("report.pdf", 1024, 100), file("notes.pdf", 10, 5)],
            &committed,
        );

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "notes.pdf");
    }

    #[test]
    fn test_same_name_different_timestamp_is_not_duplicate() {
        let mut buffer = StagingBuffer::new();

        buffer.add(vec![file("report.pdf", 1024, 100)], &[]);
        buffer.add(vec![file("report.pdf", 1024, 200)], &[]);

        assert_eq!(buffer.list().len(), 2);
    }

    #[test]
    fn test_empty_add_is_noop() {
        let mut buffer = StagingBuffer::new();

        assert!(buffer.add(Vec::new(), &[]).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut buffer = StagingBuffer::new();
        let added = buffer.add(vec![file("a.pdf", 1, 1), file("b.pdf", 2, 2)], &[]);

        assert!(buffer.remove(added[0].id));
        assert!(!buffer.remove(added[0].id));
        assert!(!buffer.remove(Uuid::new_v4()));
        assert_eq!(buffer.list().len(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_removed_file_can_be_staged_again() {
        let mut buffer = StagingBuffer::new();
        let added = buffer.add(vec![file("a.pdf", 1, 1)], &[]);

        buffer.remove(added[0].id);
        let again = buffer.add(vec![file("a.pdf", 1, 1)], &[]);

        assert_eq!(again.len(), 1);
        assert_ne!(again[0].id, added[0].id);
    }

    #[test]
    fn test_take_empties_buffer() {
        let mut buffer = StagingBuffer::new();
        buffer.add(vec![file("a.pdf", 1, 1), file("b.pdf", 2, 2)], &[]);

        let taken = buffer.take();

        assert_eq!(taken.len(), 2);
        assert!(buffer.is_empty());
    }
}
