//! Opaque wrapper around the replicated document.
//!
//! The daemon never looks inside a pit's document: it creates empty ones,
//! merges remote updates, and serializes full state for persistence. All
//! merge semantics belong to yrs.

use yrs::{Doc, ReadTxn, StateVector, Transact, Update, updates::decoder::Decode};

/// A pit's replicated document.
pub struct PitDoc {
    doc: Doc,
}

impl PitDoc {
    /// Create an empty document.
    pub fn new() -> Self {
        Self { doc: Doc::new() }
    }

    /// Rebuild a document from a stored full-state snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> anyhow::Result<Self> {
        let doc = Self::new();
        doc.apply_update(bytes)?;
        Ok(doc)
    }

    /// Merge a remote update into the document.
    pub fn apply_update(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let update = Update::decode_v1(bytes)?;
        self.doc.transact_mut().apply_update(update)?;
        Ok(())
    }

    /// Encode the full current state as one update blob. Cost is
    /// proportional to document size; there is no delta encoding here.
    pub fn encode_full(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }
}

impl Default for PitDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use yrs::Text;

    use super::*;

    fn doc_with_text(content: &str) -> PitDoc {
        let pit = PitDoc::new();
        let text = pit.doc.get_or_insert_text("scene");
        let mut txn = pit.doc.transact_mut();
        text.insert(&mut txn, 0, content);
        drop(txn);
        pit
    }

    #[test]
    fn snapshot_round_trip_is_byte_identical() {
        let original = doc_with_text("three strokes and a dot");
        let snapshot = original.encode_full();

        let restored = PitDoc::from_snapshot(&snapshot).unwrap();
        assert_eq!(restored.encode_full(), snapshot);
    }

    #[test]
    fn updates_merge_into_empty_doc() {
        let source = doc_with_text("hello");
        let target = PitDoc::new();

        target.apply_update(&source.encode_full()).unwrap();
        assert_eq!(target.encode_full(), source.encode_full());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(PitDoc::from_snapshot(&[0xff; 9]).is_err());
        assert!(PitDoc::new().apply_update(b"not an update").is_err());
    }

    #[test]
    fn empty_doc_snapshot_restores() {
        let empty = PitDoc::new();
        let restored = PitDoc::from_snapshot(&empty.encode_full()).unwrap();
        assert_eq!(restored.encode_full(), empty.encode_full());
    }
}
