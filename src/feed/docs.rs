//! Document enrichment seam for `include_docs` / `conflicts`.

use crate::core::ChangeEntry;

/// Attaches the document body and/or conflicting revision ids to an entry
/// before it is emitted. Failures surface on the entry's `err` field, not
/// as feed errors.
pub trait DocumentStore: Send + Sync {
    fn add_doc_to_entry(&self, entry: &mut ChangeEntry, include_docs: bool, conflicts: bool);
}

/// Document layer for embedders that never set `include_docs` or
/// `conflicts`.
pub struct NoDocuments;

impl DocumentStore for NoDocuments {
    fn add_doc_to_entry(&self, _entry: &mut ChangeEntry, _include_docs: bool, _conflicts: bool) {}
}
